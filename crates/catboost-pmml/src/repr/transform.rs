//! Link functions applied to per-dimension raw scores.
//!
//! # Variants
//!
//! - [`Identity`](OutputTransform::Identity): regression, score is the prediction
//! - [`Sigmoid`](OutputTransform::Sigmoid): binary classification, one score
//! - [`Softmax`](OutputTransform::Softmax): multiclass, one score per class

use crate::cbm::LossFamily;

/// Transformation from raw scores to predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputTransform {
    /// output = score.
    #[default]
    Identity,

    /// `P(1) = 1 / (1 + exp(-score))`, with `P(0) = 1 - P(1)`.
    Sigmoid,

    /// `P(k) = exp(score_k) / Σ exp(score_j)`.
    Softmax,
}

impl OutputTransform {
    /// Link used by a loss family.
    pub fn for_family(family: LossFamily) -> Self {
        match family {
            LossFamily::Regression => OutputTransform::Identity,
            LossFamily::BinaryClassification => OutputTransform::Sigmoid,
            LossFamily::MulticlassClassification => OutputTransform::Softmax,
        }
    }

    /// Turn one row of raw scores into class probabilities.
    ///
    /// Returns `None` for [`Identity`](OutputTransform::Identity). A sigmoid
    /// row yields `[P(0), P(1)]`.
    ///
    /// # NaN/Inf Behavior
    ///
    /// Sigmoid clamps its input to [-500, 500]; softmax subtracts the row
    /// maximum first. NaN propagates.
    pub fn probabilities(&self, scores: &[f64]) -> Option<Vec<f64>> {
        match self {
            OutputTransform::Identity => None,
            OutputTransform::Sigmoid => {
                let p = sigmoid(scores.first().copied().unwrap_or(0.0));
                Some(vec![1.0 - p, p])
            }
            OutputTransform::Softmax => {
                let mut row = scores.to_vec();
                softmax_inplace(&mut row);
                Some(row)
            }
        }
    }
}

/// Numerically stable sigmoid.
#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    let clamped = x.clamp(-500.0, 500.0);
    if clamped >= 0.0 {
        1.0 / (1.0 + (-clamped).exp())
    } else {
        let e = clamped.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable softmax in-place.
#[inline]
pub(crate) fn softmax_inplace(row: &mut [f64]) {
    if row.is_empty() {
        return;
    }

    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}
