//! Platform and architecture targets
//!
//! Services declare where they run as `<platform>/<architecture>`, for example
//! `qemu/x86_64` or `firecracker/arm64`. The platform half selects a machine
//! driver; the architecture half is passed through to builds, catalog queries
//! and launches.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A platform and architecture pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub platform: String,
    pub architecture: String,
}

impl Target {
    pub fn new(platform: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            architecture: architecture.into(),
        }
    }

    /// Parse `<platform>/<architecture>` on behalf of `service`.
    ///
    /// Only the first `/` separates the halves and both must be non-empty.
    pub fn parse(service: &str, value: &str) -> Result<Self> {
        let invalid = || TypesError::InvalidPlatform {
            service: service.to_string(),
            platform: value.to_string(),
        };

        let (platform, architecture) = value.split_once('/').ok_or_else(invalid)?;
        let platform = platform.trim();
        let architecture = architecture.trim();

        if platform.is_empty() || architecture.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(platform, architecture))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.architecture)
    }
}
