//! Configuration management for filedrop
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use filedrop::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! for (name, endpoint) in &config.endpoints {
//!     println!("{name} watches {}", endpoint.drop_path.display());
//! }
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FILEDROP__<section>__<key>`
//!
//! Examples:
//! - `FILEDROP__ENGINE__STOP_TIMEOUT=30s`
//! - `FILEDROP__ENDPOINTS__INVOICES__CONSUMERS=4`
//! - `FILEDROP__STATUS__ENABLED=true`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/filedrop.toml`.
//! This can be overridden using the `FILEDROP_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, DiscoveryKind, EndpointConfig, EngineConfig, StatusConfig, TelemetryConfig,
};
pub use validation::ValidationError;

use crate::engine::{ClaimRetry, EngineSettings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`FILEDROP__*`)
    /// 2. TOML file (default: `config/filedrop.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (missing paths, zero intervals, shared drop paths, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Engine tuning in the form the engine consumes
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            stop_timeout: self.engine.stop_timeout.as_duration(),
            idle_wait: self.engine.idle_wait.as_duration(),
            claim_retry: ClaimRetry {
                max_attempts: self.engine.claim_max_attempts,
                backoff: self.engine.claim_backoff.as_duration(),
            },
            route_poll_attempts: self.engine.route_poll_attempts,
            route_poll_interval: self.engine.route_poll_interval.as_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[endpoints.invoices]
drop_path = "/data/drop"
success_path = "/data/out"
failure_path = "/data/err"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.endpoints.len(), 1);
    }

    #[test]
    fn test_validation_catches_missing_endpoints() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[engine]\nidle_wait = \"2s\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::NoEndpointsConfigured)
        ));
    }

    #[test]
    fn test_engine_settings_conversion() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[engine]
stop_timeout = "5s"
claim_max_attempts = 7
claim_backoff = "50ms"

[endpoints.invoices]
drop_path = "/data/drop"
success_path = "/data/out"
failure_path = "/data/err"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Config::load_from_path(config_path).unwrap().engine_settings();
        assert_eq!(settings.stop_timeout, Duration::from_secs(5));
        assert_eq!(settings.claim_retry.max_attempts, 7);
        assert_eq!(settings.claim_retry.backoff, Duration::from_millis(50));
        assert_eq!(settings.idle_wait, Duration::from_secs(1));
    }
}
