//! Synthetic CatBoost model builder for tests, benchmarks and fuzz seeds.
//!
//! [`CbmBuilder`] writes the same FlatBuffers schema the decoder reads, so
//! tests can describe a model in a few lines instead of shipping binary
//! fixtures.
//!
//! ```
//! use catboost_pmml::testing::CbmBuilder;
//! use catboost_pmml::cbm::ModelTable;
//!
//! let bytes = CbmBuilder::new()
//!     .float_feature(0, "x", &[0.5])
//!     .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
//!     .loss("RMSE")
//!     .build();
//!
//! let table = ModelTable::from_reader(bytes.as_slice()).unwrap();
//! assert_eq!(table.n_trees(), 1);
//! ```

use std::collections::BTreeMap;

use flatbuffers::{FlatBufferBuilder, TableFinishedWIPOffset, VOffsetT, WIPOffset};

use crate::cbm::fbs::{TFloatFeature, TKeyValue, TModelCore, TModelTrees};
use crate::cbm::{NanTreatment, PARAMS_KEY};
use crate::io::ContainerWriter;

#[derive(Debug, Clone)]
struct FloatFeatureSpec {
    index: i32,
    name: String,
    borders: Vec<f32>,
    has_nans: bool,
    nan_treatment: i8,
}

/// Fluent builder for `.cbm` bytes.
///
/// Trees are appended with [`tree`](Self::tree); the `raw_*` setters replace
/// the accumulated arrays wholesale to produce inconsistent tables.
#[derive(Debug, Clone)]
pub struct CbmBuilder {
    format_version: Option<String>,
    float_features: Vec<FloatFeatureSpec>,
    approx_dimension: i32,
    tree_sizes: Vec<i32>,
    tree_splits: Vec<i32>,
    leaf_values: Vec<f64>,
    leaf_weights: Vec<f64>,
    scale: Option<f64>,
    bias: Option<f64>,
    multi_bias: Option<Vec<f64>>,
    opaque: Vec<(VOffsetT, usize)>,
    non_symmetric_nodes: usize,
    info: BTreeMap<String, String>,
    trailing_segments: Vec<Vec<u8>>,
}

impl Default for CbmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CbmBuilder {
    pub fn new() -> Self {
        Self {
            format_version: Some("FlatbuffersModel_v1".to_string()),
            float_features: Vec::new(),
            approx_dimension: 1,
            tree_sizes: Vec::new(),
            tree_splits: Vec::new(),
            leaf_values: Vec::new(),
            leaf_weights: Vec::new(),
            scale: None,
            bias: None,
            multi_bias: None,
            opaque: Vec::new(),
            non_symmetric_nodes: 0,
            info: BTreeMap::new(),
            trailing_segments: Vec::new(),
        }
    }

    // =========================================================================
    // Features and trees
    // =========================================================================

    /// Declare a float feature at split-table `index`.
    pub fn float_feature(mut self, index: i32, name: &str, borders: &[f32]) -> Self {
        self.float_features.push(FloatFeatureSpec {
            index,
            name: name.to_string(),
            borders: borders.to_vec(),
            has_nans: false,
            nan_treatment: NanTreatment::AsIs.to_raw(),
        });
        self
    }

    /// Mark the most recently declared feature as trained with NaNs routed
    /// by `treatment`.
    pub fn nan_treatment(self, treatment: NanTreatment) -> Self {
        self.raw_nan_treatment(treatment.to_raw())
    }

    /// Store an arbitrary `NanValueTreatment` byte on the last feature.
    pub fn raw_nan_treatment(mut self, raw: i8) -> Self {
        if let Some(last) = self.float_features.last_mut() {
            last.has_nans = true;
            last.nan_treatment = raw;
        }
        self
    }

    /// Append a tree. `splits.len()` is the depth; `values` holds
    /// `2^depth × dimensions` entries, dimension-minor; `weights` is either
    /// empty or `2^depth` long.
    pub fn tree(mut self, splits: &[i32], values: &[f64], weights: &[f64]) -> Self {
        self.tree_sizes.push(splits.len() as i32);
        self.tree_splits.extend_from_slice(splits);
        self.leaf_values.extend_from_slice(values);
        self.leaf_weights.extend_from_slice(weights);
        self
    }

    /// Number of output dimensions (`ApproxDimension`).
    pub fn dimensions(mut self, n: i32) -> Self {
        self.approx_dimension = n;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn bias(mut self, bias: f64) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn multi_bias(mut self, biases: &[f64]) -> Self {
        self.multi_bias = Some(biases.to_vec());
        self
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Record `loss_function.type` in the `params` entry.
    pub fn loss(self, name: &str) -> Self {
        let params = serde_json::json!({
            "loss_function": { "type": name, "params": {} },
            "boosting_options": { "iterations": 1 },
        });
        self.params_json(&params.to_string())
    }

    /// Store a raw `params` entry.
    pub fn params_json(self, json: &str) -> Self {
        self.info(PARAMS_KEY, json)
    }

    pub fn info(mut self, key: &str, value: &str) -> Self {
        self.info.insert(key.to_string(), value.to_string());
        self
    }

    pub fn format_version(mut self, version: Option<&str>) -> Self {
        self.format_version = version.map(str::to_string);
        self
    }

    // =========================================================================
    // Unsupported kinds
    // =========================================================================

    pub fn categorical_features(self, n: usize) -> Self {
        self.opaque_features(TModelTrees::VT_CAT_FEATURES, n)
    }

    pub fn one_hot_features(self, n: usize) -> Self {
        self.opaque_features(TModelTrees::VT_ONE_HOT_FEATURES, n)
    }

    pub fn ctr_features(self, n: usize) -> Self {
        self.opaque_features(TModelTrees::VT_CTR_FEATURES, n)
    }

    pub fn text_features(self, n: usize) -> Self {
        self.opaque_features(TModelTrees::VT_TEXT_FEATURES, n)
    }

    pub fn estimated_features(self, n: usize) -> Self {
        self.opaque_features(TModelTrees::VT_ESTIMATED_FEATURES, n)
    }

    pub fn embedding_features(self, n: usize) -> Self {
        self.opaque_features(TModelTrees::VT_EMBEDDING_FEATURES, n)
    }

    /// Add `n` generic tree step nodes.
    pub fn non_symmetric_nodes(mut self, n: usize) -> Self {
        self.non_symmetric_nodes = n;
        self
    }

    fn opaque_features(mut self, slot: VOffsetT, n: usize) -> Self {
        self.opaque.retain(|&(s, _)| s != slot);
        self.opaque.push((slot, n));
        self
    }

    // =========================================================================
    // Raw overrides
    // =========================================================================

    pub fn raw_leaf_values(mut self, values: &[f64]) -> Self {
        self.leaf_values = values.to_vec();
        self
    }

    pub fn raw_leaf_weights(mut self, weights: &[f64]) -> Self {
        self.leaf_weights = weights.to_vec();
        self
    }

    pub fn raw_tree_splits(mut self, splits: &[i32]) -> Self {
        self.tree_splits = splits.to_vec();
        self
    }

    pub fn raw_tree_sizes(mut self, sizes: &[i32]) -> Self {
        self.tree_sizes = sizes.to_vec();
        self
    }

    /// Append an extra container segment after the model table.
    pub fn trailing_segment(mut self, bytes: &[u8]) -> Self {
        self.trailing_segments.push(bytes.to_vec());
        self
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Complete `.cbm` container bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut writer = ContainerWriter::new(Vec::new()).expect("writing to a Vec cannot fail");
        writer
            .write_segment(&self.build_table())
            .expect("writing to a Vec cannot fail");
        for segment in &self.trailing_segments {
            writer
                .write_segment(segment)
                .expect("writing to a Vec cannot fail");
        }
        writer.finish().expect("writing to a Vec cannot fail")
    }

    /// The model table segment alone (a FlatBuffers `TModelCore`).
    pub fn build_table(&self) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();

        let float_features: Vec<WIPOffset<TFloatFeature>> = self
            .float_features
            .iter()
            .map(|f| {
                let borders = fbb.create_vector(&f.borders);
                let name = fbb.create_string(&f.name);
                let start = fbb.start_table();
                fbb.push_slot::<bool>(TFloatFeature::VT_HAS_NANS, f.has_nans, false);
                fbb.push_slot::<i32>(TFloatFeature::VT_INDEX, f.index, -1);
                fbb.push_slot::<i32>(TFloatFeature::VT_FLAT_INDEX, f.index, -1);
                fbb.push_slot_always(TFloatFeature::VT_BORDERS, borders);
                fbb.push_slot_always(TFloatFeature::VT_FEATURE_ID, name);
                fbb.push_slot::<i8>(TFloatFeature::VT_NAN_VALUE_TREATMENT, f.nan_treatment, 0);
                WIPOffset::new(fbb.end_table(start).value())
            })
            .collect();
        let float_features = fbb.create_vector(&float_features);

        let opaque: Vec<(VOffsetT, WIPOffset<_>)> = self
            .opaque
            .iter()
            .map(|&(slot, n)| {
                let tables: Vec<WIPOffset<TableFinishedWIPOffset>> = (0..n)
                    .map(|_| {
                        let start = fbb.start_table();
                        fbb.end_table(start)
                    })
                    .collect();
                (slot, fbb.create_vector(&tables))
            })
            .collect();

        let step_nodes = (self.non_symmetric_nodes > 0)
            .then(|| fbb.create_vector(&vec![0u32; self.non_symmetric_nodes]));

        let tree_sizes = fbb.create_vector(&self.tree_sizes);
        let tree_splits = fbb.create_vector(&self.tree_splits);
        let leaf_values = fbb.create_vector(&self.leaf_values);
        let leaf_weights =
            (!self.leaf_weights.is_empty()).then(|| fbb.create_vector(&self.leaf_weights));
        let multi_bias = self.multi_bias.as_ref().map(|b| fbb.create_vector(b));

        let start = fbb.start_table();
        fbb.push_slot_always::<i32>(TModelTrees::VT_APPROX_DIMENSION, self.approx_dimension);
        fbb.push_slot_always(TModelTrees::VT_TREE_SPLITS, tree_splits);
        fbb.push_slot_always(TModelTrees::VT_TREE_SIZES, tree_sizes);
        fbb.push_slot_always(TModelTrees::VT_FLOAT_FEATURES, float_features);
        fbb.push_slot_always(TModelTrees::VT_LEAF_VALUES, leaf_values);
        if let Some(weights) = leaf_weights {
            fbb.push_slot_always(TModelTrees::VT_LEAF_WEIGHTS, weights);
        }
        for (slot, tables) in opaque {
            fbb.push_slot_always(slot, tables);
        }
        if let Some(nodes) = step_nodes {
            fbb.push_slot_always(TModelTrees::VT_NON_SYMMETRIC_STEP_NODES, nodes);
        }
        if let Some(scale) = self.scale {
            fbb.push_slot_always::<f64>(TModelTrees::VT_SCALE, scale);
        }
        if let Some(bias) = self.bias {
            fbb.push_slot_always::<f64>(TModelTrees::VT_BIAS, bias);
        }
        if let Some(biases) = multi_bias {
            fbb.push_slot_always(TModelTrees::VT_MULTI_BIAS, biases);
        }
        let trees: WIPOffset<TModelTrees> = WIPOffset::new(fbb.end_table(start).value());

        let entries: Vec<WIPOffset<TKeyValue>> = self
            .info
            .iter()
            .map(|(key, value)| {
                let key = fbb.create_string(key);
                let value = fbb.create_string(value);
                let start = fbb.start_table();
                fbb.push_slot_always(TKeyValue::VT_KEY, key);
                fbb.push_slot_always(TKeyValue::VT_VALUE, value);
                WIPOffset::new(fbb.end_table(start).value())
            })
            .collect();
        let info_map = fbb.create_vector(&entries);
        let format_version = self.format_version.as_deref().map(|v| fbb.create_string(v));

        let start = fbb.start_table();
        if let Some(version) = format_version {
            fbb.push_slot_always(TModelCore::VT_FORMAT_VERSION, version);
        }
        fbb.push_slot_always(TModelCore::VT_MODEL_TREES, trees);
        fbb.push_slot_always(TModelCore::VT_INFO_MAP, info_map);
        let root: WIPOffset<TModelCore> = WIPOffset::new(fbb.end_table(start).value());

        fbb.finish(root, None);
        fbb.finished_data().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbm::ModelTable;
    use crate::error::{ConvertError, FeatureKind};

    #[test]
    fn trailing_segments_are_skipped() {
        let bytes = CbmBuilder::new()
            .float_feature(0, "x", &[0.5])
            .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
            .loss("RMSE")
            .trailing_segment(b"ctr data")
            .build();
        let table = ModelTable::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(table.n_trees(), 1);
    }

    #[test]
    fn metadata_round_trips() {
        let bytes = CbmBuilder::new()
            .info("model_guid", "abc")
            .loss("Logloss")
            .build_table();
        let table = ModelTable::decode(&bytes).unwrap();
        assert_eq!(table.info.get("model_guid").map(String::as_str), Some("abc"));
        assert_eq!(table.format_version.as_deref(), Some("FlatbuffersModel_v1"));
    }

    #[test]
    fn supplementary_kinds_are_rejected() {
        let cases = [
            (CbmBuilder::new().text_features(1), FeatureKind::Text),
            (CbmBuilder::new().embedding_features(1), FeatureKind::Embedding),
            (CbmBuilder::new().estimated_features(1), FeatureKind::Estimated),
            (CbmBuilder::new().non_symmetric_nodes(3), FeatureKind::NonSymmetricTree),
        ];
        for (builder, expected) in cases {
            let err = ModelTable::decode(&builder.loss("RMSE").build_table()).unwrap_err();
            assert!(
                matches!(err, ConvertError::UnsupportedFeature { kind, .. } if kind == expected),
                "{expected}: {err}"
            );
        }
    }
}
