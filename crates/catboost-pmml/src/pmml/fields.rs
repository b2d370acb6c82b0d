//! Field names used across the document.

use std::collections::HashSet;

use crate::config::EncoderConfig;
use crate::error::EncodeError;
use crate::repr::Ensemble;

/// Every name the document declares, checked for uniqueness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldNames {
    pub target: String,
    /// Per-dimension raw-value output fields (empty for regression).
    pub values: Vec<String>,
    /// Per-class probability output fields (empty for regression).
    pub probabilities: Vec<String>,
}

impl FieldNames {
    pub fn new(ensemble: &Ensemble, config: &EncoderConfig) -> Result<Self, EncodeError> {
        let n_dimensions = ensemble.n_dimensions();
        let values = if ensemble.kind.is_classification() {
            (0..n_dimensions)
                .map(|k| value_field_name(&config.value_field, k, n_dimensions))
                .collect()
        } else {
            Vec::new()
        };
        let probabilities = ensemble
            .kind
            .n_classes()
            .map(|n| (0..n).map(probability_field_name).collect())
            .unwrap_or_default();

        let names = Self {
            target: config.target_name.clone(),
            values,
            probabilities,
        };

        let mut seen = HashSet::new();
        let all = ensemble
            .features
            .iter()
            .map(|f| f.name.as_str())
            .chain(std::iter::once(names.target.as_str()))
            .chain(names.values.iter().map(String::as_str))
            .chain(names.probabilities.iter().map(String::as_str));
        for name in all {
            if !seen.insert(name) {
                return Err(EncodeError::FieldCollision(name.to_string()));
            }
        }

        Ok(names)
    }
}

/// `cbValue` for a single dimension, `cbValue(k)` otherwise.
pub fn value_field_name(base: &str, k: usize, n_dimensions: usize) -> String {
    if n_dimensions == 1 {
        base.to_string()
    } else {
        format!("{base}({k})")
    }
}

/// `probability(k)`.
pub fn probability_field_name(class: usize) -> String {
    format!("probability({class})")
}
