//! Decoded CatBoost model table.
//!
//! [`ModelTable`] is an owned copy of the fields the converter needs from the
//! FlatBuffers `TModelCore`. Decoding rejects unsupported feature kinds and
//! checks the flat-array layout invariants, so every downstream stage can index
//! the arrays without further bounds reasoning:
//!
//! - `Σ depth == tree_splits.len()`
//! - `Σ 2^depth × n_dimensions == leaf_values.len()`
//! - `Σ 2^depth == leaf_weights.len()` (when weights are present)

use std::collections::BTreeMap;
use std::io::Read;

use tracing::{debug, warn};

use super::fbs::{self, TModelTrees};
use super::params::LossFunction;
use super::splits::NanTreatment;
use crate::error::{ConvertError, FeatureKind};
use crate::io::ContainerReader;

/// Deepest tree the leaf-index arithmetic supports.
pub const MAX_TREE_DEPTH: usize = 31;

/// Upper bound on output dimensions accepted from a table.
pub const MAX_DIMENSIONS: usize = 1 << 16;

// ============================================================================
// Feature descriptors
// ============================================================================

/// A numeric input feature and its split borders.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDescriptor {
    /// Placement in the global split table (not the declaration position).
    pub index: usize,
    /// Feature name (`FeatureId`, or `f{index}` when the model has none).
    pub name: String,
    /// Split borders in ascending split-index order.
    pub borders: Vec<f32>,
    /// Branch taken by a missing value.
    pub nan_treatment: NanTreatment,
}

// ============================================================================
// ModelTable
// ============================================================================

/// Owned, validated view of a CatBoost oblivious-tree model.
#[derive(Debug, Clone)]
pub struct ModelTable {
    /// Schema format version string, if the writer set one.
    pub format_version: Option<String>,
    /// Float feature descriptors in declaration order.
    pub float_features: Vec<FeatureDescriptor>,
    /// Depth of each tree.
    pub tree_depths: Vec<usize>,
    /// Split-table index for every level of every tree, tree-major.
    pub tree_splits: Vec<usize>,
    /// Leaf values, tree-major, leaf-major, dimension-minor.
    pub leaf_values: Vec<f64>,
    /// Leaf weights (one per leaf, shared across dimensions). Empty if absent.
    pub leaf_weights: Vec<f64>,
    /// Number of output dimensions.
    pub n_dimensions: usize,
    /// Multiplier applied to every dimension's tree sum.
    pub scale: f64,
    /// Per-dimension constant added after scaling.
    pub biases: Vec<f64>,
    /// String metadata map.
    pub info: BTreeMap<String, String>,
}

impl ModelTable {
    /// Read a `.cbm` stream and decode its model table segment.
    ///
    /// Trailing segments (auxiliary model parts) are skipped without being
    /// buffered; damage past the model table only produces a warning.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConvertError> {
        let mut container = ContainerReader::new(reader)?;
        let segment = container
            .read_segment()?
            .ok_or(ConvertError::Truncated {
                expected: 4,
                actual: 0,
            })?;
        let table = Self::decode(&segment)?;

        let mut trailing = 0usize;
        loop {
            match container.skip_segment() {
                Ok(Some(_)) => trailing += 1,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "unreadable data after the model table");
                    break;
                }
            }
        }
        if trailing > 0 {
            warn!(trailing, "ignoring trailing container segments");
        }

        Ok(table)
    }

    /// Decode a model table segment.
    pub fn decode(segment: &[u8]) -> Result<Self, ConvertError> {
        let core = fbs::root_as_model_core(segment)?;
        let trees = core
            .model_trees()
            .ok_or_else(|| ConvertError::internal("model has no tree tables"))?;

        reject_unsupported(&trees)?;

        let float_features = decode_float_features(&trees)?;

        let tree_depths = trees
            .tree_sizes()
            .map(|v| v.iter().map(checked_depth).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();

        let tree_splits = trees
            .tree_splits()
            .map(|v| {
                v.iter()
                    .map(|s| {
                        usize::try_from(s).map_err(|_| {
                            ConvertError::internal(format!("negative split index {s}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let leaf_values: Vec<f64> = trees.leaf_values().map(|v| v.iter().collect()).unwrap_or_default();
        let leaf_weights: Vec<f64> =
            trees.leaf_weights().map(|v| v.iter().collect()).unwrap_or_default();

        let n_dimensions = usize::try_from(trees.approx_dimension())
            .ok()
            .filter(|&d| d > 0 && d <= MAX_DIMENSIONS)
            .ok_or_else(|| {
                ConvertError::internal(format!(
                    "invalid output dimension {}",
                    trees.approx_dimension()
                ))
            })?;

        let biases = decode_biases(&trees, n_dimensions)?;

        let info = core
            .info_map()
            .map(|entries| {
                entries
                    .iter()
                    .map(|kv| (kv.key().to_string(), kv.value().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let table = Self {
            format_version: core.format_version().map(str::to_string),
            float_features,
            tree_depths,
            tree_splits,
            leaf_values,
            leaf_weights,
            n_dimensions,
            scale: trees.scale(),
            biases,
            info,
        };
        table.validate_layout()?;

        debug!(
            format_version = table.format_version.as_deref().unwrap_or("unknown"),
            n_trees = table.n_trees(),
            n_features = table.float_features.len(),
            n_dimensions = table.n_dimensions,
            model_parts = core.model_part_ids().map_or(0, |ids| ids.len()),
            "decoded model table"
        );

        Ok(table)
    }

    /// Number of trees (per dimension).
    pub fn n_trees(&self) -> usize {
        self.tree_depths.len()
    }

    /// Total number of leaves across all trees, for one dimension.
    pub fn n_leaves(&self) -> usize {
        self.tree_depths.iter().map(|&d| 1usize << d).sum()
    }

    /// Whether the model carries leaf weights.
    pub fn has_leaf_weights(&self) -> bool {
        !self.leaf_weights.is_empty()
    }

    /// Classify the loss function recorded in the `params` metadata entry.
    pub fn loss_function(&self) -> Result<LossFunction, ConvertError> {
        LossFunction::from_info_map(&self.info)
    }

    /// Iterate over each tree's `(depth, split range, leaf range)`.
    ///
    /// Leaf ranges index a single dimension's leaves; multiply by
    /// `n_dimensions` to address `leaf_values`.
    pub fn tree_layouts(&self) -> impl Iterator<Item = TreeLayout> + '_ {
        let mut split_offset = 0;
        let mut leaf_offset = 0;
        self.tree_depths.iter().map(move |&depth| {
            let layout = TreeLayout {
                depth,
                split_offset,
                leaf_offset,
            };
            split_offset += depth;
            leaf_offset += 1usize << depth;
            layout
        })
    }

    /// Check the flat-array invariants.
    pub fn validate_layout(&self) -> Result<(), ConvertError> {
        let total_depth: usize = self.tree_depths.iter().sum();
        if total_depth != self.tree_splits.len() {
            return Err(ConvertError::internal(format!(
                "tree depths sum to {total_depth} but {} split indices are stored",
                self.tree_splits.len()
            )));
        }

        let n_leaves = self.n_leaves();
        let expected_values = n_leaves.checked_mul(self.n_dimensions);
        if expected_values != Some(self.leaf_values.len()) {
            return Err(ConvertError::internal(format!(
                "expected {n_leaves} leaves x {} dimensions leaf values, found {}",
                self.n_dimensions,
                self.leaf_values.len()
            )));
        }

        if self.leaf_weights.is_empty() {
            if n_leaves > 0 {
                warn!("model has no leaf weights; record counts will be omitted");
            }
        } else if self.leaf_weights.len() != n_leaves {
            return Err(ConvertError::internal(format!(
                "expected {n_leaves} leaf weights, found {}",
                self.leaf_weights.len()
            )));
        }

        if self.biases.len() != self.n_dimensions {
            return Err(ConvertError::internal(format!(
                "expected {} bias values, found {}",
                self.n_dimensions,
                self.biases.len()
            )));
        }

        Ok(())
    }
}

/// Position of one tree inside the flat arrays of a [`ModelTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLayout {
    pub depth: usize,
    pub split_offset: usize,
    pub leaf_offset: usize,
}

impl TreeLayout {
    pub fn n_leaves(&self) -> usize {
        1usize << self.depth
    }
}

// ============================================================================
// Decoding helpers
// ============================================================================

fn reject_unsupported(trees: &TModelTrees<'_>) -> Result<(), ConvertError> {
    let kinds = [
        (FeatureKind::Categorical, TModelTrees::VT_CAT_FEATURES),
        (FeatureKind::OneHot, TModelTrees::VT_ONE_HOT_FEATURES),
        (FeatureKind::Combination, TModelTrees::VT_CTR_FEATURES),
        (FeatureKind::Text, TModelTrees::VT_TEXT_FEATURES),
        (FeatureKind::Estimated, TModelTrees::VT_ESTIMATED_FEATURES),
        (FeatureKind::Embedding, TModelTrees::VT_EMBEDDING_FEATURES),
    ];
    for (kind, slot) in kinds {
        let count = trees.opaque_len(slot);
        if count != 0 {
            return Err(ConvertError::UnsupportedFeature { kind, count });
        }
    }

    let count = trees.non_symmetric_step_nodes_len();
    if count != 0 {
        return Err(ConvertError::UnsupportedFeature {
            kind: FeatureKind::NonSymmetricTree,
            count,
        });
    }

    Ok(())
}

fn decode_float_features(trees: &TModelTrees<'_>) -> Result<Vec<FeatureDescriptor>, ConvertError> {
    let Some(features) = trees.float_features() else {
        return Ok(Vec::new());
    };

    features
        .iter()
        .map(|feature| {
            let index = usize::try_from(feature.index()).map_err(|_| {
                ConvertError::internal(format!("float feature has index {}", feature.index()))
            })?;
            let name = match feature.feature_id() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => format!("f{index}"),
            };
            let borders = feature.borders().map(|b| b.iter().collect()).unwrap_or_default();
            Ok(FeatureDescriptor {
                index,
                name,
                borders,
                nan_treatment: NanTreatment::from_raw(feature.nan_value_treatment())?,
            })
        })
        .collect()
}

fn checked_depth(raw: i32) -> Result<usize, ConvertError> {
    usize::try_from(raw)
        .ok()
        .filter(|&d| d <= MAX_TREE_DEPTH)
        .ok_or_else(|| ConvertError::internal(format!("invalid tree depth {raw}")))
}

fn decode_biases(trees: &TModelTrees<'_>, n_dimensions: usize) -> Result<Vec<f64>, ConvertError> {
    let multi: Vec<f64> = trees.multi_bias().map(|v| v.iter().collect()).unwrap_or_default();
    match multi.len() {
        0 => Ok(vec![trees.bias(); n_dimensions]),
        1 => Ok(vec![multi[0]; n_dimensions]),
        n if n == n_dimensions => Ok(multi),
        n => Err(ConvertError::internal(format!(
            "{n} bias values for {n_dimensions} output dimensions"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CbmBuilder;

    fn regression_builder() -> CbmBuilder {
        CbmBuilder::new()
            .float_feature(0, "x", &[0.5])
            .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
            .loss("RMSE")
    }

    #[test]
    fn decodes_regression_table() {
        let table = ModelTable::decode(&regression_builder().build_table()).unwrap();

        assert_eq!(table.n_trees(), 1);
        assert_eq!(table.n_dimensions, 1);
        assert_eq!(table.tree_depths, vec![1]);
        assert_eq!(table.tree_splits, vec![0]);
        assert_eq!(table.leaf_values, vec![1.0, 3.0]);
        assert_eq!(table.leaf_weights, vec![10.0, 5.0]);
        assert_eq!(table.float_features[0].name, "x");
        assert_eq!(table.float_features[0].borders, vec![0.5]);
        assert_eq!(table.scale, 1.0);
        assert_eq!(table.biases, vec![0.0]);
        assert_eq!(table.loss_function().unwrap().name(), "RMSE");
    }

    #[test]
    fn reads_through_container() {
        let bytes = regression_builder().build();
        let table = ModelTable::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(table.n_leaves(), 2);
    }

    #[test]
    fn empty_container_is_truncated() {
        let err = ModelTable::from_reader(&b"CBM1"[..]).unwrap_err();
        assert!(matches!(err, ConvertError::Truncated { .. }));
    }

    #[test]
    fn truncated_trailing_segment_is_ignored() {
        let mut bytes = regression_builder().trailing_segment(b"auxiliary").build();
        bytes.truncate(bytes.len() - 3);
        let table = ModelTable::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(table.n_trees(), 1);
    }

    #[test]
    fn decodes_nan_treatment() {
        let bytes = CbmBuilder::new()
            .float_feature(0, "x", &[0.5])
            .float_feature(1, "y", &[0.5])
            .nan_treatment(NanTreatment::AsTrue)
            .loss("RMSE")
            .build_table();
        let table = ModelTable::decode(&bytes).unwrap();
        assert_eq!(table.float_features[0].nan_treatment, NanTreatment::AsIs);
        assert_eq!(table.float_features[1].nan_treatment, NanTreatment::AsTrue);
    }

    #[test]
    fn unknown_nan_treatment_is_internal_error() {
        let bytes = CbmBuilder::new()
            .float_feature(0, "x", &[0.5])
            .raw_nan_treatment(9)
            .loss("RMSE")
            .build_table();
        let err = ModelTable::decode(&bytes).unwrap_err();
        assert!(matches!(err, ConvertError::InternalDecode(_)));
    }

    #[test]
    fn garbage_segment_is_invalid_table() {
        let err = ModelTable::decode(&[0xAB; 3]).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTable(_)));
    }

    #[test]
    fn rejects_categorical_features() {
        let bytes = regression_builder().categorical_features(2).build_table();
        let err = ModelTable::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedFeature {
                kind: FeatureKind::Categorical,
                count: 2
            }
        ));
    }

    #[test]
    fn rejects_one_hot_and_ctr_features() {
        let err = ModelTable::decode(&regression_builder().one_hot_features(1).build_table())
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedFeature {
                kind: FeatureKind::OneHot,
                ..
            }
        ));

        let err =
            ModelTable::decode(&regression_builder().ctr_features(4).build_table()).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedFeature {
                kind: FeatureKind::Combination,
                count: 4
            }
        ));
    }

    #[test]
    fn leaf_value_count_mismatch() {
        let bytes = regression_builder()
            .raw_leaf_values(&[1.0, 2.0, 3.0])
            .build_table();
        let err = ModelTable::decode(&bytes).unwrap_err();
        assert!(matches!(err, ConvertError::InternalDecode(_)));
    }

    #[test]
    fn split_count_mismatch() {
        let bytes = regression_builder().raw_tree_splits(&[0, 0]).build_table();
        let err = ModelTable::decode(&bytes).unwrap_err();
        assert!(matches!(err, ConvertError::InternalDecode(_)));
    }

    #[test]
    fn leaf_weight_count_mismatch() {
        let bytes = regression_builder()
            .raw_leaf_weights(&[1.0, 2.0, 3.0, 4.0])
            .build_table();
        let err = ModelTable::decode(&bytes).unwrap_err();
        assert!(matches!(err, ConvertError::InternalDecode(_)));
    }

    #[test]
    fn missing_leaf_weights_are_tolerated() {
        let bytes = regression_builder().raw_leaf_weights(&[]).build_table();
        let table = ModelTable::decode(&bytes).unwrap();
        assert!(!table.has_leaf_weights());
    }

    #[test]
    fn unnamed_feature_gets_default_name() {
        let bytes = CbmBuilder::new()
            .float_feature(3, "", &[1.0])
            .loss("RMSE")
            .build_table();
        let table = ModelTable::decode(&bytes).unwrap();
        assert_eq!(table.float_features[0].name, "f3");
    }

    #[test]
    fn single_bias_broadcasts() {
        let bytes = CbmBuilder::new()
            .float_feature(0, "x", &[0.5])
            .dimensions(3)
            .tree(&[0], &[0.0; 6], &[1.0, 1.0])
            .multi_bias(&[0.25])
            .loss("MultiClass")
            .build_table();
        let table = ModelTable::decode(&bytes).unwrap();
        assert_eq!(table.biases, vec![0.25; 3]);
    }

    #[test]
    fn tree_layouts_follow_depths() {
        let bytes = CbmBuilder::new()
            .float_feature(0, "x", &[0.1, 0.2, 0.3])
            .tree(&[0, 1], &[0.0; 4], &[0.0; 4])
            .tree(&[2], &[0.0; 2], &[0.0; 2])
            .tree(&[], &[7.0], &[1.0])
            .loss("RMSE")
            .build_table();
        let table = ModelTable::decode(&bytes).unwrap();

        let layouts: Vec<TreeLayout> = table.tree_layouts().collect();
        assert_eq!(
            layouts,
            vec![
                TreeLayout { depth: 2, split_offset: 0, leaf_offset: 0 },
                TreeLayout { depth: 1, split_offset: 2, leaf_offset: 4 },
                TreeLayout { depth: 0, split_offset: 3, leaf_offset: 6 },
            ]
        );
    }
}
