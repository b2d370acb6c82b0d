//! Encoder configuration with builder pattern.
//!
//! # Example
//!
//! ```
//! use catboost_pmml::EncoderConfig;
//!
//! let config = EncoderConfig::builder().build().unwrap();
//! assert_eq!(config.target_name, "_target");
//!
//! let config = EncoderConfig::builder()
//!     .target_name("label")
//!     .indent(0)
//!     .build()
//!     .unwrap();
//! ```

use bon::Builder;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field name option is empty.
    EmptyName { field: &'static str },
    /// The target and the raw-value output share one name.
    DuplicateName(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName { field } => write!(f, "{} must not be empty", field),
            Self::DuplicateName(name) => {
                write!(f, "target_name and value_field are both {:?}", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// EncoderConfig
// =============================================================================

/// Options for the PMML document writer.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct EncoderConfig {
    /// Name of the target field. Default: `_target`.
    #[builder(into, default = String::from("_target"))]
    pub target_name: String,

    /// Name of the per-dimension raw-value output field. Default: `cbValue`.
    ///
    /// Multi-class documents suffix it with the class index: `cbValue(k)`.
    #[builder(into, default = String::from("cbValue"))]
    pub value_field: String,

    /// Spaces per nesting level; `0` writes a single line. Default: 2.
    #[builder(default = 2)]
    pub indent: usize,

    /// Emit `recordCount` on leaves when the model has weights. Default: true.
    #[builder(default = true)]
    pub write_record_counts: bool,
}

impl<S: encoder_config_builder::IsComplete> EncoderConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a name is empty or `target_name` equals
    /// `value_field`.
    pub fn build(self) -> Result<EncoderConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl EncoderConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_name.is_empty() {
            return Err(ConfigError::EmptyName {
                field: "target_name",
            });
        }
        if self.value_field.is_empty() {
            return Err(ConfigError::EmptyName {
                field: "value_field",
            });
        }
        if self.target_name == self.value_field {
            return Err(ConfigError::DuplicateName(self.target_name.clone()));
        }
        Ok(())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}
