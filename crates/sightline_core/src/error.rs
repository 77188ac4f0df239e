//! # Configuration Error Types
//!
//! Loading settings is the only fallible surface of the core. Runtime paths
//! absorb remote faults and report neutral values instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for the settings schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but violates a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No scene root source was configured.
    #[error("no scene root configured")]
    MissingRoot,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
