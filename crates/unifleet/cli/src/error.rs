//! CLI error types

use std::path::PathBuf;
use thiserror::Error;
use unifleet_compose::ComposeError;
use unifleet_drivers::DriverError;
use unifleet_watch::WatchError;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No compose file in the working directory
    #[error("no compose file found in {}", .0.display())]
    ComposeFileNotFound(PathBuf),

    /// Compose file could not be mapped to a project
    #[error("{}: {message}", path.display())]
    ComposeFile { path: PathBuf, message: String },

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
