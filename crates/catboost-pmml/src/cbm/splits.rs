//! Global split table.
//!
//! Every tree level stores a flat integer that indexes this table. The table
//! is laid out feature-major by *feature index* (not declaration order), with
//! one entry per border in border order. That ordering is part of the wire
//! format: a different layout silently rebinds every tree level to the wrong
//! threshold.

use std::sync::Arc;

use super::table::FeatureDescriptor;
use crate::error::ConvertError;

// ============================================================================
// NanTreatment
// ============================================================================

/// Where a missing (NaN) feature value goes at a split.
///
/// Mirrors CatBoost's `ENanValueTreatment`. A split sends a value right when
/// `value > border`; NaN fails that comparison unless the feature was trained
/// with `nan_mode=Max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NanTreatment {
    /// Plain comparison: NaN is never greater than a border, so it goes left.
    #[default]
    AsIs,
    /// `nan_mode=Min`: NaN sorts below every border and goes left.
    AsFalse,
    /// `nan_mode=Max`: NaN sorts above every border and goes right.
    AsTrue,
}

impl NanTreatment {
    /// Decode the schema's `ENanValueTreatment` byte.
    pub fn from_raw(raw: i8) -> Result<Self, ConvertError> {
        match raw {
            0 => Ok(NanTreatment::AsIs),
            1 => Ok(NanTreatment::AsFalse),
            2 => Ok(NanTreatment::AsTrue),
            other => Err(ConvertError::internal(format!(
                "unknown NaN value treatment {other}"
            ))),
        }
    }

    /// Schema byte for this treatment.
    pub fn to_raw(self) -> i8 {
        match self {
            NanTreatment::AsIs => 0,
            NanTreatment::AsFalse => 1,
            NanTreatment::AsTrue => 2,
        }
    }

    #[inline]
    pub fn missing_goes_left(self) -> bool {
        !matches!(self, NanTreatment::AsTrue)
    }
}

// ============================================================================
// Split
// ============================================================================

/// Threshold split: `feature <= border` goes left, `feature > border` goes right.
///
/// Values are compared at `f32` precision, the type borders are stored in.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSplit {
    /// Feature index (position in a scoring row).
    pub feature: usize,
    /// Feature name as written to the document.
    pub name: Arc<str>,
    pub border: f32,
    /// Routing of missing values.
    pub nan_treatment: NanTreatment,
}

impl ThresholdSplit {
    /// Whether a feature value takes the left branch.
    #[inline]
    pub fn goes_left(&self, value: f64) -> bool {
        if value.is_nan() {
            self.nan_treatment.missing_goes_left()
        } else {
            (value as f32) <= self.border
        }
    }
}

/// A split condition referenced by tree levels.
///
/// Only numeric thresholds exist today; categorical kinds would be added as
/// further variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Split {
    Threshold(ThresholdSplit),
}

// ============================================================================
// SplitTable
// ============================================================================

/// Ordered catalogue of splits addressed by flat index.
///
/// A `None` entry is a placeholder for a feature slot no descriptor filled.
/// It exists only so that a tree referencing it is detected as corrupt.
#[derive(Debug, Clone, Default)]
pub struct SplitTable {
    entries: Vec<Option<Split>>,
}

impl SplitTable {
    /// Build the table from float feature descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InternalDecode`] if a descriptor's index is
    /// outside the feature range or two descriptors claim the same index.
    pub fn build(features: &[FeatureDescriptor]) -> Result<Self, ConvertError> {
        // Unsupported feature kinds would reserve further slots; they are
        // rejected during decoding, so only float slots exist here.
        let mut slots: Vec<Option<Vec<Split>>> = vec![None; features.len()];

        for feature in features {
            let n_slots = slots.len();
            let slot = slots.get_mut(feature.index).ok_or_else(|| {
                ConvertError::internal(format!(
                    "feature {:?} has index {} but only {n_slots} feature slots exist",
                    feature.name, feature.index
                ))
            })?;
            if slot.is_some() {
                return Err(ConvertError::internal(format!(
                    "feature index {} declared more than once",
                    feature.index
                )));
            }

            let name: Arc<str> = Arc::from(feature.name.as_str());
            *slot = Some(
                feature
                    .borders
                    .iter()
                    .map(|&border| {
                        Split::Threshold(ThresholdSplit {
                            feature: feature.index,
                            name: Arc::clone(&name),
                            border,
                            nan_treatment: feature.nan_treatment,
                        })
                    })
                    .collect(),
            );
        }

        let entries = slots
            .into_iter()
            .flat_map(|slot| match slot {
                Some(splits) => splits.into_iter().map(Some).collect(),
                None => vec![None],
            })
            .collect();

        Ok(Self { entries })
    }

    /// Number of entries, placeholders included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the split at a flat index.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InternalDecode`] for an out-of-range index or a
    /// placeholder entry.
    pub fn get(&self, index: usize) -> Result<&Split, ConvertError> {
        match self.entries.get(index) {
            Some(Some(split)) => Ok(split),
            Some(None) => Err(ConvertError::internal(format!(
                "split index {index} refers to an unfilled feature slot"
            ))),
            None => Err(ConvertError::internal(format!(
                "split index {index} out of range ({} splits)",
                self.entries.len()
            ))),
        }
    }

    /// Iterate over all entries in flat-index order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Split>> {
        self.entries.iter().map(Option::as_ref)
    }
}
