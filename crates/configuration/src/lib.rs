//! # Configuration
//!
//! Loads the application settings from a YAML file (by default `config/agents.yaml`).
//!
//! ## Architectural Principles
//!
//! - **Explicit context:** settings are loaded once by the binary and handed to each
//!   component; nothing in the workspace reads configuration from globals.
//! - **Fail fast on structure:** a missing file or a missing credential is an error at
//!   load time, not a surprise in the middle of a tuning run.
//!
//! ## Public API
//!
//! - `load_config`: read, expand `${VAR}` placeholders, parse and validate.
//! - `LoggingConfig::init`: tracing setup with an optional rotating JSON-line file.
//! - `RotatingFile`: the size-bounded writer behind that file.

use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod env;
pub mod error;
pub mod logging;
pub mod rotation;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use env::{expand_env_placeholders, unresolved_placeholders};
pub use logging::{LogFileConfig, LogFormat, LoggingConfig};
pub use rotation::{RotatingFile, prune_old_logs};
pub use settings::{
    AppConfig, BacktestSettings, BattleSettings, FallbackParameters, LabSettings, LlmSettings,
    MemoryBackend, MemorySettings, PathSettings, StrategySettings, TuningSettings,
    VerifierSettings,
};

/// The default location of the settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/agents.yaml";

/// Prefix for environment overrides, e.g. `TUNELOOP__TUNING__MAX_LOOPS=20`.
pub const ENV_PREFIX: &str = "TUNELOOP";

/// Loads the application configuration from a YAML file.
///
/// This function is the primary entry point for this crate. Placeholders are expanded
/// against the process environment before parsing, `TUNELOOP__*` variables override
/// file values, and the result is validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::MissingFile(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path)?;
    load_config_from_str(&raw, env::process_env)
}

/// Same as [`load_config`] but from in-memory YAML and a caller-supplied variable lookup.
pub fn load_config_from_str<F>(yaml: &str, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_env_placeholders(yaml, lookup);

    let builder = config::Config::builder()
        .add_source(config::File::from_str(&expanded, config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `AppConfig` struct
    let config = builder.try_deserialize::<AppConfig>()?;
    validate(&config)?;

    Ok(config)
}

/// Names of the top-level sections present in a YAML document, sorted. Nothing is
/// expanded or validated.
pub fn top_level_sections(yaml: &str) -> Result<Vec<String>, ConfigError> {
    let raw = config::Config::builder()
        .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
        .build()?
        .try_deserialize::<std::collections::BTreeMap<String, config::Value>>()?;
    Ok(raw.into_keys().collect())
}

/// Checks the invariants serde cannot express.
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("llm.base_url", &config.llm.base_url),
        ("llm.model", &config.llm.model),
        ("llm.api_key", &config.llm.api_key),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} is required", field)));
        }
        let unresolved = unresolved_placeholders(value);
        if !unresolved.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} references unset environment variable(s): {}",
                field,
                unresolved.join(", ")
            )));
        }
    }

    let bounds = &config.tuning.bounds;
    for (field, range) in [("roi", bounds.roi), ("stoploss", bounds.stoploss)] {
        if range.min > range.max {
            return Err(ConfigError::ValidationError(format!(
                "tuning.bounds.{}: min {} exceeds max {}",
                field, range.min, range.max
            )));
        }
    }
    if bounds.stoploss.min < -rust_decimal::Decimal::ONE
        || bounds.stoploss.max >= rust_decimal::Decimal::ZERO
    {
        return Err(ConfigError::ValidationError(
            "tuning.bounds.stoploss must lie within [-1, 0)".to_string(),
        ));
    }
    if bounds.roi.min <= rust_decimal::Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "tuning.bounds.roi.min must be positive".to_string(),
        ));
    }
    if config.tuning.llm_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "tuning.llm_attempts must be at least 1".to_string(),
        ));
    }
    if config.memory.short_term_window == 0 {
        return Err(ConfigError::ValidationError(
            "memory.short_term_window must be at least 1".to_string(),
        ));
    }

    Ok(())
}
