//! Configuration management for transferbox
//!
//! Settings are layered from (lowest priority first):
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Variables from a `.env` file in the working directory
//! 4. System environment variables
//!
//! A `.env` entry never replaces a variable already set in the process
//! environment. Only [`Config::load`] reads `.env`; `load_from_path` uses
//! the file and the process environment.
//!
//! # Usage
//!
//! ```no_run
//! use transferbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Download chunk size: {}", config.download.chunk_size);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `TRANSFERBOX__<section>__<key>`:
//! - `TRANSFERBOX__HTTP__CONNECT_TIMEOUT_MS=3000`
//! - `TRANSFERBOX__DOWNLOAD__CHUNK_SIZE=64KB`
//! - `TRANSFERBOX__UPLOAD__DEFAULT_METHOD=PUT`
//!
//! The file defaults to `config/transferbox.toml` and can be moved with
//! `TRANSFERBOX_CONFIG`.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, DownloadConfig, HttpConfig, LoggingConfig, UploadConfig};
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
    /// Returns an error if the file is malformed or validation fails.
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

    /// Effective configuration rendered as TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
