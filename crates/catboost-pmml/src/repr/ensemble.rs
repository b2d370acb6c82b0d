//! Ensemble assembly.
//!
//! Groups the reconstructed trees by output dimension. Each dimension is an
//! unweighted sum of its trees, rescaled by the model's `scale` and shifted by
//! the dimension's bias; the loss family decides which link turns the
//! per-dimension sums into a prediction.
//!
//! Tree shape (depth and split indices) is shared by all dimensions. Only
//! the leaf values differ, read with stride `n_dimensions` from the flat
//! leaf-value array.

use ndarray::ArrayView2;
use tracing::{debug, info};

use super::transform::OutputTransform;
use super::tree::{PredicateTree, TreeSpec};
use crate::cbm::{FeatureDescriptor, LossFamily, LossFunction, ModelTable, SplitTable};
use crate::error::ConvertError;

// ============================================================================
// OutputKind
// ============================================================================

/// What the ensemble predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A single continuous value.
    Regression,
    /// Two classes, one logit.
    BinaryClassification,
    /// `n_classes` classes, one score per class.
    MulticlassClassification { n_classes: usize },
}

impl OutputKind {
    fn new(family: LossFamily, n_dimensions: usize) -> Self {
        match family {
            LossFamily::Regression => OutputKind::Regression,
            LossFamily::BinaryClassification => OutputKind::BinaryClassification,
            LossFamily::MulticlassClassification => OutputKind::MulticlassClassification {
                n_classes: n_dimensions,
            },
        }
    }

    /// Number of target categories (`None` for regression).
    pub fn n_classes(&self) -> Option<usize> {
        match *self {
            OutputKind::Regression => None,
            OutputKind::BinaryClassification => Some(2),
            OutputKind::MulticlassClassification { n_classes } => Some(n_classes),
        }
    }

    pub fn is_classification(&self) -> bool {
        !matches!(self, OutputKind::Regression)
    }
}

// ============================================================================
// DimensionModel
// ============================================================================

/// Sum of trees for one output dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionModel {
    pub trees: Vec<PredicateTree>,
    pub scale: f64,
    pub bias: f64,
}

impl DimensionModel {
    /// Whether `scale`/`bias` change the plain tree sum.
    pub fn has_rescale(&self) -> bool {
        self.scale != 1.0 || self.bias != 0.0
    }

    /// Unscaled sum of the leaf values selected by `row`.
    pub fn tree_sum(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|tree| tree.predict(row)).sum()
    }

    /// `scale * tree_sum + bias`.
    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.scale * self.tree_sum(row) + self.bias
    }
}

// ============================================================================
// Ensemble
// ============================================================================

/// A fully reconstructed model ready for encoding or scoring.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub kind: OutputKind,
    /// Float features in declaration order.
    pub features: Vec<FeatureDescriptor>,
    /// One sub-model per output dimension.
    pub dimensions: Vec<DimensionModel>,
    pub loss: LossFunction,
}

/// Scored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Per-dimension raw scores.
    pub raw: Vec<f64>,
    /// Class probabilities (`None` for regression).
    pub probabilities: Option<Vec<f64>>,
}

impl Ensemble {
    /// Link applied on top of the raw scores.
    pub fn transform(&self) -> OutputTransform {
        OutputTransform::for_family(self.loss.family())
    }

    pub fn n_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Trees per dimension.
    pub fn n_trees(&self) -> usize {
        self.dimensions.first().map_or(0, |d| d.trees.len())
    }

    /// Per-dimension raw scores for a dense row indexed by feature index.
    pub fn raw_scores(&self, row: &[f64]) -> Vec<f64> {
        self.dimensions.iter().map(|d| d.raw_score(row)).collect()
    }

    /// Raw scores plus link-transformed probabilities.
    pub fn predict(&self, row: &[f64]) -> Prediction {
        let raw = self.raw_scores(row);
        let probabilities = self.transform().probabilities(&raw);
        Prediction { raw, probabilities }
    }
}

impl ModelTable {
    /// Rebuild every tree for every dimension and combine them.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::UnsupportedLossFunction`] if the loss is not
    ///   supported or does not match the output dimension
    /// - [`ConvertError::InvalidParams`] if the loss cannot be read
    /// - [`ConvertError::InternalDecode`] if a tree references a bad split
    pub fn to_ensemble(&self) -> Result<Ensemble, ConvertError> {
        let loss = self.loss_function()?;
        loss.check_dimension(self.n_dimensions)?;

        let splits = SplitTable::build(&self.float_features)?;
        debug!(n_splits = splits.len(), "built split table");

        // Leaf-major, dimension-minor: row = flat leaf position, column = dimension.
        let values = ArrayView2::from_shape((self.n_leaves(), self.n_dimensions), &self.leaf_values)
            .map_err(|e| ConvertError::internal(format!("leaf value layout: {e}")))?;
        let weights = self.has_leaf_weights().then_some(self.leaf_weights.as_slice());

        let dimensions = (0..self.n_dimensions)
            .map(|k| {
                let column = values.column(k);
                let trees = self
                    .tree_layouts()
                    .map(|layout| {
                        let leaves = layout.leaf_offset..layout.leaf_offset + layout.n_leaves();
                        let spec = TreeSpec {
                            depth: layout.depth,
                            split_indices: &self.tree_splits
                                [layout.split_offset..layout.split_offset + layout.depth],
                            leaf_values: column.slice(ndarray::s![leaves.clone()]),
                            leaf_weights: weights.map(|w| &w[leaves]),
                        };
                        PredicateTree::reconstruct(&spec, &splits)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DimensionModel {
                    trees,
                    scale: self.scale,
                    bias: self.biases[k],
                })
            })
            .collect::<Result<Vec<_>, ConvertError>>()?;

        let kind = OutputKind::new(loss.family(), self.n_dimensions);
        info!(
            loss = %loss,
            trees = self.n_trees(),
            dimensions = self.n_dimensions,
            features = self.float_features.len(),
            "assembled ensemble"
        );

        Ok(Ensemble {
            kind,
            features: self.float_features.clone(),
            dimensions,
            loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CbmBuilder;
    use approx::assert_abs_diff_eq;

    fn ensemble(builder: CbmBuilder) -> Ensemble {
        ModelTable::decode(&builder.build_table())
            .unwrap()
            .to_ensemble()
            .unwrap()
    }

    #[test]
    fn regression_sum() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
                .loss("RMSE"),
        );

        assert_eq!(model.kind, OutputKind::Regression);
        assert_eq!(model.n_trees(), 1);
        assert_eq!(model.raw_scores(&[0.2]), vec![1.0]);
        assert_eq!(model.raw_scores(&[0.9]), vec![3.0]);
        assert_eq!(model.predict(&[0.9]).probabilities, None);
    }

    #[test]
    fn trees_are_summed() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .float_feature(1, "y", &[1.0, 2.0])
                .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
                .tree(&[2, 1], &[0.1, 0.2, 0.3, 0.4], &[1.0; 4])
                .loss("RMSE"),
        );

        // x=0.9 -> 3.0; y=1.5: level 0 (y <= 2.0) left, level 1 (y <= 1.0) right -> leaf 0b10 = 0.3.
        assert_abs_diff_eq!(model.raw_scores(&[0.9, 1.5])[0], 3.3, epsilon = 1e-12);
    }

    #[test]
    fn scale_and_bias_apply_per_dimension() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
                .scale(2.0)
                .bias(0.5)
                .loss("RMSE"),
        );

        assert!(model.dimensions[0].has_rescale());
        assert_abs_diff_eq!(model.raw_scores(&[0.9])[0], 6.5, epsilon = 1e-12);
    }

    #[test]
    fn binary_sigmoid_of_zero_is_half() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .tree(&[0], &[0.0, 2.0], &[1.0, 1.0])
                .loss("Logloss"),
        );

        assert_eq!(model.kind, OutputKind::BinaryClassification);
        let p = model.predict(&[0.1]).probabilities.unwrap();
        assert_abs_diff_eq!(p[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn multiclass_uses_strided_leaf_values() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .dimensions(3)
                // leaf 0: [1, 1, 1], leaf 1: [0, 5, 0]
                .tree(&[0], &[1.0, 1.0, 1.0, 0.0, 5.0, 0.0], &[2.0, 3.0])
                .loss("MultiClass"),
        );

        assert_eq!(model.kind, OutputKind::MulticlassClassification { n_classes: 3 });
        assert_eq!(model.raw_scores(&[0.9]), vec![0.0, 5.0, 0.0]);

        let p = model.predict(&[0.1]).probabilities.unwrap();
        for v in p {
            assert_abs_diff_eq!(v, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn multi_bias_per_dimension() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .dimensions(2)
                .tree(&[0], &[0.0, 0.0, 0.0, 0.0], &[1.0, 1.0])
                .multi_bias(&[0.25, -0.25])
                .loss("MultiClass"),
        );
        assert_eq!(model.raw_scores(&[0.0]), vec![0.25, -0.25]);
    }

    #[test]
    fn missing_weights_leave_leaves_unweighted() {
        let model = ensemble(
            CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .tree(&[0], &[1.0, 3.0], &[])
                .loss("RMSE"),
        );
        let tree = &model.dimensions[0].trees[0];
        let leaf = tree.node(tree.leaf_for(&[0.0]));
        assert!(matches!(
            leaf.kind,
            crate::repr::NodeKind::Leaf { weight: None, .. }
        ));
    }

    #[test]
    fn dimension_mismatch_is_unsupported() {
        let table = ModelTable::decode(
            &CbmBuilder::new()
                .float_feature(0, "x", &[0.5])
                .dimensions(2)
                .tree(&[0], &[0.0; 4], &[1.0, 1.0])
                .loss("RMSE")
                .build_table(),
        )
        .unwrap();
        let err = table.to_ensemble().unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedLossFunction(_)));
    }

    #[test]
    fn feature_index_beyond_slots_is_internal_error() {
        let table = ModelTable::decode(
            &CbmBuilder::new()
                .float_feature(1, "y", &[0.5])
                .float_feature(2, "z", &[0.5])
                .tree(&[0], &[0.0, 1.0], &[1.0, 1.0])
                .loss("RMSE")
                .build_table(),
        );
        // Two descriptors give two feature slots; index 2 does not exist.
        let err = table.and_then(|t| t.to_ensemble()).unwrap_err();
        assert!(matches!(err, ConvertError::InternalDecode(_)));
    }
}
