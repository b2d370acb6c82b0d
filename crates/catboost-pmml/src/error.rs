//! Error types for reading CatBoost models and writing PMML documents.
//!
//! Every failure is fatal for the conversion at hand: there is no partial
//! output and no retry. Errors carry enough context to point at the
//! originating condition (which byte range, which feature kind, which tree).

use std::fmt;

use thiserror::Error;

use crate::io::container::MAGIC;

// ============================================================================
// Feature kinds
// ============================================================================

/// Feature kinds a CatBoost model can declare besides plain float features.
///
/// None of these can be expressed as threshold splits, so a model declaring
/// any of them is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Categorical features (hashed category values).
    Categorical,
    /// One-hot encoded categorical features.
    OneHot,
    /// Counter (CTR) combination features.
    Combination,
    /// Text features.
    Text,
    /// Embedding features.
    Embedding,
    /// Features estimated from text/embedding inputs.
    Estimated,
    /// Generic (non-oblivious) tree nodes.
    NonSymmetricTree,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Categorical => "categorical",
            Self::OneHot => "one-hot",
            Self::Combination => "combination (CTR)",
            Self::Text => "text",
            Self::Embedding => "embedding",
            Self::Estimated => "estimated",
            Self::NonSymmetricTree => "non-symmetric tree node",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Conversion errors
// ============================================================================

/// Errors that can occur while reading a `.cbm` file and rebuilding its trees.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input does not start with the CatBoost magic tag.
    #[error("not a CatBoost model: expected magic {:?}, found {found:?}", String::from_utf8_lossy(MAGIC))]
    Format { found: Vec<u8> },

    /// A segment (or its length prefix) ended before the declared size.
    #[error("segment truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// The model uses a feature kind that cannot be converted.
    #[error("unsupported feature kind: {count} {kind} feature(s) declared")]
    UnsupportedFeature { kind: FeatureKind, count: usize },

    /// The loss function is unknown, or inconsistent with the output dimension.
    #[error("unsupported loss function: {0}")]
    UnsupportedLossFunction(String),

    /// The model table violates a layout invariant (corrupt or unexpected table).
    #[error("internal decode error: {0}")]
    InternalDecode(String),

    /// The model table segment is not a valid FlatBuffers `TModelCore`.
    #[error("invalid model table: {0}")]
    InvalidTable(#[from] flatbuffers::InvalidFlatbuffer),

    /// The `params` metadata entry is missing or malformed.
    #[error("invalid training params: {0}")]
    InvalidParams(String),

    /// I/O error while reading the container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalDecode(message.into())
    }
}

// ============================================================================
// Encoding errors
// ============================================================================

/// Errors that can occur while writing a PMML document.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configured output name clashes with an input feature name.
    #[error("field name {0:?} is used both as a feature and as an output")]
    FieldCollision(String),

    /// Invalid encoder configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The ensemble's dimensions do not fit its output kind.
    #[error("inconsistent ensemble: {0}")]
    Model(String),
}

// ============================================================================
// Pipeline error
// ============================================================================

/// Either stage of a `.cbm` to PMML conversion.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}
