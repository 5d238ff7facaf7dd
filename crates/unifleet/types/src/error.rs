//! Error types for unifleet-types
//!
//! Everything here is a validation failure: it is raised before any driver
//! is touched.

use thiserror::Error;

/// Errors raised while validating or interpreting a project
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid platform: {platform} for service {service}")]
    InvalidPlatform { service: String, platform: String },

    #[error("invalid image reference: {0}")]
    InvalidImageRef(String),

    #[error("project has no name")]
    MissingProjectName,

    #[error("duplicate service name: {0}")]
    DuplicateService(String),

    #[error("duplicate network name: {0}")]
    DuplicateNetwork(String),

    #[error("service {service} attaches to undeclared network {network}")]
    UnknownNetwork { service: String, network: String },

    #[error("invalid subnet {subnet} for network {network}")]
    InvalidSubnet { network: String, subnet: String },

    #[error("address {address} requested by service {service} is outside subnet {subnet}")]
    AddressOutsideSubnet {
        service: String,
        address: String,
        subnet: String,
    },

    #[error("address {address} requested more than once on network {network}")]
    DuplicateAddress { network: String, address: String },

    #[error("no free addresses left in subnet {subnet} of network {network}")]
    AddressExhausted { network: String, subnet: String },
}

/// Result type for type-level operations
pub type Result<T> = std::result::Result<T, TypesError>;
