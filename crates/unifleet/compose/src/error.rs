//! Compose error types

use thiserror::Error;
use unifleet_drivers::DriverError;
use unifleet_types::TypesError;

/// Errors from artifact resolution and reconciliation
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid project: {0}")]
    Validation(#[from] TypesError),

    #[error("service {service}: no image found and no build context to build from")]
    Unresolvable { service: String },

    #[error("service {service}: artifact resolution failed: {source}")]
    Resolution {
        service: String,
        #[source]
        source: DriverError,
    },

    #[error("{resource}: {source}")]
    Driver {
        resource: String,
        #[source]
        source: DriverError,
    },

    #[error("could not list {what}: {source}")]
    Listing {
        what: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("could not persist state of project {project}: {source}")]
    Store {
        project: String,
        #[source]
        source: DriverError,
    },

    #[error("{} service(s) failed: {}", failed.len(), failed.join(", "))]
    ServicesFailed { failed: Vec<String> },
}

impl ComposeError {
    pub(crate) fn resolution(service: &str, source: DriverError) -> Self {
        ComposeError::Resolution {
            service: service.to_string(),
            source,
        }
    }

    pub(crate) fn driver(resource: impl Into<String>, source: DriverError) -> Self {
        ComposeError::Driver {
            resource: resource.into(),
            source,
        }
    }

    /// Errors that abort a pass, as opposed to per-service failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ComposeError::Validation(_)
                | ComposeError::Listing { .. }
                | ComposeError::Store { .. }
                | ComposeError::ServicesFailed { .. }
        )
    }
}

/// Result type for compose operations
pub type Result<T> = std::result::Result<T, ComposeError>;
