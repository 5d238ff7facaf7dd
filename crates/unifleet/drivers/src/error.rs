//! Driver error types

use std::fmt;
use thiserror::Error;

/// Kind of resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Machine,
    Network,
    Package,
    Project,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Machine => write!(f, "machine"),
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Package => write!(f, "package"),
            ResourceKind::Project => write!(f, "project"),
        }
    }
}

/// Driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("unsupported platform driver: {0}")]
    UnsupportedPlatform(String),

    #[error("no platform driver registered")]
    NoPlatform,

    #[error("platform error: {0}")]
    Platform(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("packaging failed: {0}")]
    Package(String),

    #[error("log stream error: {0}")]
    Logs(String),

    #[error("event stream error: {0}")]
    Stream(String),

    /// The event stream ended on a message that was not an event.
    #[error("event stream ended without delivering an event")]
    NonEventStreamEnd,

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl DriverError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        DriverError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, name: impl Into<String>) -> Self {
        DriverError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Stream conditions that end observation without being a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, DriverError::NonEventStreamEnd)
    }
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_non_event_end_is_benign() {
        assert!(DriverError::NonEventStreamEnd.is_benign());
        assert!(!DriverError::Stream("socket closed".into()).is_benign());
        assert!(!DriverError::Cancelled.is_benign());
    }

    #[test]
    fn test_not_found_message() {
        let err = DriverError::not_found(ResourceKind::Network, "net0");
        assert_eq!(err.to_string(), "network not found: net0");
    }
}
