//! Convert a CatBoost `.cbm` model into a PMML document.
//!
//! Usage:
//!   cbm2pmml --cbm-input model.cbm --pmml-output model.pmml
//!
//! The output file is only created once the whole model has been converted.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catboost_pmml::{encode_pmml, read_ensemble, EncoderConfig};

const DEFAULT_FILTER: &str = "cbm2pmml=info,catboost_pmml=info";
const VERBOSE_FILTER: &str = "cbm2pmml=debug,catboost_pmml=debug";

/// Convert a CatBoost binary model (.cbm) to PMML 4.4.
#[derive(Parser, Debug)]
#[command(name = "cbm2pmml")]
#[command(version, about, long_about = None)]
struct Cli {
    /// CatBoost model file
    #[arg(long = "cbm-input", value_name = "PATH")]
    cbm_input: PathBuf,

    /// PMML file to write
    #[arg(long = "pmml-output", value_name = "PATH")]
    pmml_output: PathBuf,

    /// Name of the target field
    #[arg(long = "target-name", value_name = "NAME", default_value = "_target")]
    target_name: String,

    /// Write the document on a single line
    #[arg(long)]
    compact: bool,

    /// Omit leaf recordCount attributes
    #[arg(long = "no-record-counts")]
    no_record_counts: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EncoderConfig::builder()
        .target_name(cli.target_name.as_str())
        .indent(if cli.compact { 0 } else { 2 })
        .write_record_counts(!cli.no_record_counts)
        .build()
        .context("invalid options")?;

    let input = File::open(&cli.cbm_input)
        .with_context(|| format!("failed to open {}", cli.cbm_input.display()))?;
    let ensemble = read_ensemble(BufReader::new(input))
        .with_context(|| format!("failed to read model {}", cli.cbm_input.display()))?;

    let document = encode_pmml(&ensemble, &config, Vec::new())
        .context("failed to encode PMML document")?;
    fs::write(&cli.pmml_output, &document)
        .with_context(|| format!("failed to write {}", cli.pmml_output.display()))?;

    info!(
        output = %cli.pmml_output.display(),
        bytes = document.len(),
        "wrote PMML document"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_required_paths() {
        let cli = Cli::try_parse_from([
            "cbm2pmml",
            "--cbm-input",
            "in.cbm",
            "--pmml-output",
            "out.pmml",
            "--compact",
        ])
        .unwrap();
        assert_eq!(cli.cbm_input, PathBuf::from("in.cbm"));
        assert_eq!(cli.target_name, "_target");
        assert!(cli.compact);
        assert!(!cli.no_record_counts);
    }

    #[test]
    fn missing_output_is_rejected() {
        assert!(Cli::try_parse_from(["cbm2pmml", "--cbm-input", "in.cbm"]).is_err());
    }
}
