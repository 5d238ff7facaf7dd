//! Watch error types

use thiserror::Error;
use unifleet_drivers::DriverError;

/// Errors that end a watch
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("could not list machines: {0}")]
    Listing(#[source] DriverError),

    #[error("observer task failed: {0}")]
    Observer(String),
}

/// Result type for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
