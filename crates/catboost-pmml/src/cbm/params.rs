//! Training parameters stored in the model's `params` metadata entry.
//!
//! CatBoost serializes its full training configuration as JSON. Only the
//! loss function is needed to decide how raw tree sums become predictions.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ConvertError;

/// Metadata key holding the JSON training parameters.
pub const PARAMS_KEY: &str = "params";

#[derive(Debug, Deserialize)]
struct TrainingParams {
    loss_function: LossFunctionParams,
}

#[derive(Debug, Deserialize)]
struct LossFunctionParams {
    #[serde(rename = "type")]
    name: String,
}

/// How the per-dimension raw sums are turned into the final prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossFamily {
    /// Raw sum is the prediction.
    Regression,
    /// Logistic link over a single raw sum.
    BinaryClassification,
    /// Softmax over one raw sum per class.
    MulticlassClassification,
}

/// A recognised CatBoost loss function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossFunction {
    name: String,
    family: LossFamily,
}

impl LossFunction {
    /// Classify a CatBoost loss function identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UnsupportedLossFunction`] for identifiers whose
    /// prediction cannot be expressed as a sum with an identity, logistic or
    /// softmax link.
    pub fn from_name(name: &str) -> Result<Self, ConvertError> {
        let family = match name {
            "RMSE" | "MAE" | "Quantile" | "MAPE" | "Lq" | "Huber" | "Expectile" => {
                LossFamily::Regression
            }
            "Logloss" | "CrossEntropy" => LossFamily::BinaryClassification,
            "MultiClass" => LossFamily::MulticlassClassification,
            other => return Err(ConvertError::UnsupportedLossFunction(other.to_string())),
        };
        Ok(Self {
            name: name.to_string(),
            family,
        })
    }

    /// Extract and classify `loss_function.type` from the metadata map.
    pub fn from_info_map(info: &BTreeMap<String, String>) -> Result<Self, ConvertError> {
        let params = info.get(PARAMS_KEY).ok_or_else(|| {
            ConvertError::InvalidParams(format!("metadata has no {PARAMS_KEY:?} entry"))
        })?;
        Self::from_params_json(params)
    }

    /// Extract and classify `loss_function.type` from the JSON parameter blob.
    pub fn from_params_json(json: &str) -> Result<Self, ConvertError> {
        let params: TrainingParams = serde_json::from_str(json)
            .map_err(|e| ConvertError::InvalidParams(e.to_string()))?;
        Self::from_name(&params.loss_function.name)
    }

    /// CatBoost identifier, e.g. `"Logloss"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> LossFamily {
        self.family
    }

    /// Check that the model's output dimension fits this loss family.
    pub fn check_dimension(&self, n_dimensions: usize) -> Result<(), ConvertError> {
        let ok = match self.family {
            LossFamily::Regression | LossFamily::BinaryClassification => n_dimensions == 1,
            LossFamily::MulticlassClassification => n_dimensions >= 2,
        };
        if ok {
            Ok(())
        } else {
            Err(ConvertError::UnsupportedLossFunction(format!(
                "{} with {n_dimensions} output dimension(s)",
                self.name
            )))
        }
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
