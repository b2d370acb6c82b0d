//! CatBoost binary model (`.cbm`) support.
//!
//! This module decodes the model table stored in a `.cbm` container and
//! prepares the split catalogue the trees refer to.
//!
//! # Format Overview
//!
//! A `.cbm` file is a [container](crate::io::container) whose first segment is
//! a FlatBuffers `TModelCore` table. Oblivious trees are stored as flat arrays:
//!
//! - `TreeSizes`: depth of each tree
//! - `TreeSplits`: one split-table index per tree level, tree-major
//! - `LeafValues`: `2^depth × dimensions` values per tree, dimension-minor
//! - `LeafWeights`: `2^depth` weights per tree
//!
//! Split indices address a global table built from the float feature
//! descriptors (see [`SplitTable`]).
//!
//! # Example
//!
//! ```ignore
//! use catboost_pmml::cbm::ModelTable;
//!
//! let table = ModelTable::from_reader(std::fs::File::open("model.cbm")?)?;
//! let ensemble = table.to_ensemble()?;
//! ```

pub mod fbs;
mod params;
mod splits;
mod table;

pub use params::{LossFamily, LossFunction, PARAMS_KEY};
pub use splits::{NanTreatment, Split, SplitTable, ThresholdSplit};
pub use table::{FeatureDescriptor, ModelTable, TreeLayout, MAX_DIMENSIONS, MAX_TREE_DEPTH};
