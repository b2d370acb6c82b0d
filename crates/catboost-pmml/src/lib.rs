//! catboost-pmml: convert CatBoost oblivious-tree models to PMML.
//!
//! Reads the `.cbm` binary container written by CatBoost, rebuilds every
//! oblivious tree as an explicit predicate tree and writes a PMML 4.4
//! document with the same scoring semantics.
//!
//! # Key Types
//!
//! - [`ModelTable`] - decoded, validated model arrays
//! - [`Ensemble`] - reconstructed trees grouped by output dimension
//! - [`EncoderConfig`] - document options
//! - [`PmmlWriter`] - document writer
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufWriter;
//!
//! use catboost_pmml::{convert, EncoderConfig};
//!
//! let input = File::open("model.cbm")?;
//! let output = BufWriter::new(File::create("model.pmml")?);
//! convert(input, &EncoderConfig::default(), output)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Only float features are supported. Models with categorical, one-hot, CTR,
//! text, embedding or estimated features, or with non-symmetric trees, are
//! rejected.

use std::io::{Read, Write};

pub mod cbm;
pub mod config;
pub mod error;
pub mod io;
pub mod pmml;
pub mod repr;
pub mod testing;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use cbm::{LossFamily, LossFunction, ModelTable};
pub use config::{ConfigError, EncoderConfig};
pub use error::{ConvertError, EncodeError, Error, FeatureKind};
pub use pmml::{encode_pmml, to_pmml_string, PmmlWriter};
pub use repr::{Ensemble, OutputKind, Prediction};

/// Read a `.cbm` model from `reader` and write it as PMML to `writer`.
///
/// Nothing is written unless the whole model converts.
pub fn convert<R: Read, W: Write>(reader: R, config: &EncoderConfig, writer: W) -> Result<W, Error> {
    let ensemble = read_ensemble(reader)?;
    Ok(encode_pmml(&ensemble, config, writer)?)
}

/// Read a `.cbm` model and rebuild its ensemble.
pub fn read_ensemble<R: Read>(reader: R) -> Result<Ensemble, ConvertError> {
    ModelTable::from_reader(reader)?.to_ensemble()
}
