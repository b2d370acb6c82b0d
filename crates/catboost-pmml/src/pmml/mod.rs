//! PMML document encoder.
//!
//! [`PmmlWriter`] turns an [`Ensemble`](crate::repr::Ensemble) into a PMML 4.4
//! document that any compliant engine can score.

mod fields;
mod writer;

use std::io::Write;

pub use fields::{probability_field_name, value_field_name};
pub use writer::PmmlWriter;

use crate::config::EncoderConfig;
use crate::error::EncodeError;
use crate::repr::Ensemble;

/// Namespace of the generated documents.
pub const PMML_NAMESPACE: &str = "http://www.dmg.org/PMML-4_4";

/// Schema version of the generated documents.
pub const PMML_VERSION: &str = "4.4";

/// Write `ensemble` to `writer`, returning the writer.
pub fn encode_pmml<W: Write>(
    ensemble: &Ensemble,
    config: &EncoderConfig,
    writer: W,
) -> Result<W, EncodeError> {
    PmmlWriter::new(writer, config.clone())?.write_ensemble(ensemble)
}

/// Render `ensemble` as a PMML string.
pub fn to_pmml_string(ensemble: &Ensemble, config: &EncoderConfig) -> Result<String, EncodeError> {
    let bytes = encode_pmml(ensemble, config, Vec::new())?;
    String::from_utf8(bytes)
        .map_err(|e| EncodeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
