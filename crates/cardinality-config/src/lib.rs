//! Unified configuration for the cardinality analyzer binary.
//!
//! Supports configuration from multiple sources, highest priority first:
//! 1. Environment variables (`CARDINALITY_*`)
//! 2. Config file path from `CARDINALITY_CONFIG`
//! 3. Config file contents from `CARDINALITY_CONFIG_CONTENT`
//! 4. Default config file locations (`./config.toml`, `./.cardinality.toml`)
//! 5. Built-in defaults

use anyhow::Result;
use cardinality_core::AnalyzerConfig;
use serde::{Deserialize, Serialize};

mod sources;
mod validation;

/// Top-level configuration: the analyzer's own knobs (§6 configuration
/// surface), plus this process's HTTP server and logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4319".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority.
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from an explicit file path, still applying env
    /// var overrides on top (same priority as `CARDINALITY_CONFIG`).
    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        sources::load_config_from_path(path)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_validation() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen_addr, "0.0.0.0:4319");
        assert_eq!(config.server.log_format, LogFormat::Text);
    }
}
