//! Configuration structures.
//!
//! Configuration is loaded from environment variables or a JSON document.

use serde::{Deserialize, Serialize};

use super::errors::{Error, Result};

/// Global runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Driver loop configuration.
    #[serde(default)]
    pub driver: DriverConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a JSON document. Missing sections fall back to defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build from `EPISODE7_*` environment variables, starting from defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(level) = lookup("EPISODE7_LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Some(format) = lookup("EPISODE7_LOG_FORMAT") {
            config.observability.json_logs = format.eq_ignore_ascii_case("json");
        }
        if let Some(raw) = lookup("EPISODE7_CATCH_PANICS") {
            config.driver.catch_panics = parse_bool("EPISODE7_CATCH_PANICS", &raw)?;
        }
        if let Some(raw) = lookup("EPISODE7_RECORD_ARGS") {
            config.driver.record_args = parse_bool("EPISODE7_RECORD_ARGS", &raw)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("{key}: expected a boolean, got `{other}`"))),
    }
}

/// Driver loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Turn panics raised by processes and effects into `Error::Panicked`
    /// instead of unwinding through the caller.
    pub catch_panics: bool,

    /// Keep effect arguments in recorded traces.
    pub record_args: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            record_args: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
