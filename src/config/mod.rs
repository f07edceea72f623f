//! Configuration management for ledgerflow
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use ledgerflow::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `LEDGERFLOW__<section>__<key>`
//!
//! Examples:
//! - `LEDGERFLOW__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `LEDGERFLOW__REPLICATION__SYNC_PERIOD=10s`
//! - `LEDGERFLOW__REPLICATION__PIPELINE__LOGS_PAGE_SIZE=500`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/ledgerflow.toml`.
//! This can be overridden using the `LEDGERFLOW_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, GlobalExporterConfig, PipelineConfig, ReplicationConfig, ServerConfig, TelemetryConfig,
};
pub use sources::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
pub use validation::{MAX_LOGS_PAGE_SIZE, ValidationError};

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
    /// 1. Environment variables (`LEDGERFLOW__*`)
    /// 2. TOML file (default: `config/ledgerflow.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
