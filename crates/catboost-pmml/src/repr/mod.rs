//! In-memory model representation.
//!
//! - [`tree`]: oblivious tree to explicit predicate tree
//! - [`ensemble`]: per-dimension sums and output kind
//! - [`transform`]: sigmoid and softmax links

pub mod ensemble;
pub mod transform;
pub mod tree;

pub use ensemble::{DimensionModel, Ensemble, OutputKind, Prediction};
pub use transform::OutputTransform;
pub use tree::{Node, NodeId, NodeKind, Predicate, PredicateTree, TreeSpec};
