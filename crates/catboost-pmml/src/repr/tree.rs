//! Oblivious tree reconstruction.
//!
//! An oblivious tree of depth `d` is fully described by `d` split indices (one
//! per level, shared by every node on that level) and `2^d` leaf values. Leaf
//! `i` is reached by going right at level `k` exactly when bit `k` of `i` is
//! set.
//!
//! [`PredicateTree`] expands that compact form into an explicit binary tree
//! whose nodes carry the predicate that selects them, which is the shape the
//! document encoder needs. Nodes live in a flat arena in pre-order (root
//! first, left subtree before right subtree).

use std::fmt;

use ndarray::ArrayView1;

use crate::cbm::{Split, SplitTable, ThresholdSplit, MAX_TREE_DEPTH};
use crate::error::ConvertError;

/// Index of a node in a [`PredicateTree`] arena.
pub type NodeId = u32;

// ============================================================================
// Predicate
// ============================================================================

/// Condition under which a node is entered from its parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Root predicate.
    True,
    /// `feature <= border` (left branch).
    LessOrEqual(ThresholdSplit),
    /// `feature > border` (right branch).
    GreaterThan(ThresholdSplit),
}

impl Predicate {
    /// Evaluate against a dense feature row.
    ///
    /// Missing features read as NaN and follow the split's
    /// [`NanTreatment`](crate::cbm::NanTreatment), so exactly one of a
    /// sibling pair holds for every row.
    #[inline]
    pub fn evaluate(&self, row: &[f64]) -> bool {
        match self {
            Predicate::True => true,
            Predicate::LessOrEqual(split) => split.goes_left(feature_value(row, split.feature)),
            Predicate::GreaterThan(split) => !split.goes_left(feature_value(row, split.feature)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => f.write_str("true"),
            Predicate::LessOrEqual(s) => write!(f, "{} <= {}", s.name, s.border),
            Predicate::GreaterThan(s) => write!(f, "{} > {}", s.name, s.border),
        }
    }
}

#[inline]
fn feature_value(row: &[f64], feature: usize) -> f64 {
    row.get(feature).copied().unwrap_or(f64::NAN)
}

// ============================================================================
// Nodes
// ============================================================================

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Internal node. The left child's predicate is `<=`, the right's `>`.
    Branch { left: NodeId, right: NodeId },
    /// Terminal node.
    Leaf {
        value: f64,
        /// Training weight that reached this leaf, if the model recorded it.
        weight: Option<f64>,
        /// Position in the tree's flat leaf array.
        leaf_index: usize,
    },
}

/// Arena node: the predicate that selects it plus its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub predicate: Predicate,
    pub kind: NodeKind,
}

impl Node {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

// ============================================================================
// TreeSpec
// ============================================================================

/// Flat description of one oblivious tree for one output dimension.
#[derive(Debug, Clone)]
pub struct TreeSpec<'a> {
    pub depth: usize,
    /// Split-table index per level (`depth` entries).
    pub split_indices: &'a [usize],
    /// Leaf values for one dimension (`2^depth` entries, possibly strided).
    pub leaf_values: ArrayView1<'a, f64>,
    /// Leaf weights (`2^depth` entries), if recorded.
    pub leaf_weights: Option<&'a [f64]>,
}

impl TreeSpec<'_> {
    fn validate(&self) -> Result<(), ConvertError> {
        if self.depth > MAX_TREE_DEPTH {
            return Err(ConvertError::internal(format!("tree depth {} too large", self.depth)));
        }
        if self.split_indices.len() != self.depth {
            return Err(ConvertError::internal(format!(
                "tree of depth {} has {} split indices",
                self.depth,
                self.split_indices.len()
            )));
        }
        let n_leaves = 1usize << self.depth;
        if self.leaf_values.len() != n_leaves {
            return Err(ConvertError::internal(format!(
                "tree of depth {} has {} leaf values",
                self.depth,
                self.leaf_values.len()
            )));
        }
        if let Some(weights) = self.leaf_weights {
            if weights.len() != n_leaves {
                return Err(ConvertError::internal(format!(
                    "tree of depth {} has {} leaf weights",
                    self.depth,
                    weights.len()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// PredicateTree
// ============================================================================

/// Explicit binary tree rebuilt from an oblivious tree.
///
/// Always complete: a tree of depth `d` has `2^d` leaves and `2^d - 1`
/// branches, even when sibling leaves hold equal values.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateTree {
    nodes: Vec<Node>,
    depth: usize,
}

impl PredicateTree {
    /// Rebuild a tree from its flat description.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InternalDecode`] if the slices do not match the
    /// depth or a level references an unusable split-table entry.
    pub fn reconstruct(spec: &TreeSpec<'_>, splits: &SplitTable) -> Result<Self, ConvertError> {
        spec.validate()?;

        // Resolve each level's split once; every node on a level shares it.
        let levels = spec
            .split_indices
            .iter()
            .map(|&index| match splits.get(index)? {
                Split::Threshold(threshold) => Ok(threshold),
            })
            .collect::<Result<Vec<_>, ConvertError>>()?;

        let n_nodes = (1usize << (spec.depth + 1)) - 1;
        let mut builder = Builder {
            spec,
            levels: &levels,
            nodes: Vec::with_capacity(n_nodes),
        };
        builder.build(Predicate::True, 0, 0);

        Ok(Self {
            nodes: builder.nodes,
            depth: spec.depth,
        })
    }

    /// Root node id.
    #[inline]
    pub fn root(&self) -> NodeId {
        0
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn n_branches(&self) -> usize {
        self.nodes.len() - self.n_leaves()
    }

    /// Child taken by a row whose split feature is missing (`None` for leaves).
    pub fn missing_child(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).kind {
            NodeKind::Branch { left, right } => {
                let goes_left = match &self.node(left).predicate {
                    Predicate::LessOrEqual(split) => split.nan_treatment.missing_goes_left(),
                    _ => false,
                };
                Some(if goes_left { left } else { right })
            }
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Walk from the root to the leaf selected by a feature row.
    pub fn leaf_for(&self, row: &[f64]) -> NodeId {
        let mut id = self.root();
        while let NodeKind::Branch { left, right } = self.node(id).kind {
            id = if self.node(left).predicate.evaluate(row) {
                left
            } else {
                right
            };
        }
        id
    }

    /// Leaf value selected by a feature row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        match self.node(self.leaf_for(row)).kind {
            NodeKind::Leaf { value, .. } => value,
            NodeKind::Branch { .. } => unreachable!("leaf_for always stops at a leaf"),
        }
    }
}

/// Recursive pre-order arena builder.
struct Builder<'s, 'a> {
    spec: &'s TreeSpec<'a>,
    levels: &'s [&'s ThresholdSplit],
    nodes: Vec<Node>,
}

impl Builder<'_, '_> {
    fn build(&mut self, predicate: Predicate, index: usize, depth: usize) -> NodeId {
        let id = self.nodes.len() as NodeId;

        if depth == self.spec.depth {
            self.nodes.push(Node {
                predicate,
                kind: NodeKind::Leaf {
                    value: self.spec.leaf_values[index],
                    weight: self.spec.leaf_weights.map(|w| w[index]),
                    leaf_index: index,
                },
            });
            return id;
        }

        // Children are patched in once their ids are known.
        self.nodes.push(Node {
            predicate,
            kind: NodeKind::Branch { left: 0, right: 0 },
        });

        let split = self.levels[depth];
        let left = self.build(Predicate::LessOrEqual(split.clone()), index, depth + 1);
        let right = self.build(
            Predicate::GreaterThan(split.clone()),
            index | (1 << depth),
            depth + 1,
        );
        self.nodes[id as usize].kind = NodeKind::Branch { left, right };

        id
    }
}
