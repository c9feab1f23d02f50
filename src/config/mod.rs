//! Configuration management for fetchmesh
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FETCHMESH__<section>__<key>`
//!
//! Examples:
//! - `FETCHMESH__COORDINATOR__BIND_ADDR=0.0.0.0:9000`
//! - `FETCHMESH__COORDINATOR__COOLDOWN_SECS=120`
//! - `FETCHMESH__NODE__COORDINATOR_URL=http://coord:8502`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/fetchmesh.toml`.
//! This can be overridden using the `FETCHMESH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, CoordinatorConfig, DispatchRetryConfig, FetchConfig, NodeConfig,
};
pub use validation::ValidationError;

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
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails (zero retry attempts, empty directories, etc.)
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
}
