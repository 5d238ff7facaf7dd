//! Image references
//!
//! An image reference names a package in the catalog: `org/app:1.2`. A
//! reference without a tag means `latest`. A colon inside the registry host
//! (`localhost:5000/app`) is part of the name, not a tag separator.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version used when a reference carries no tag
pub const DEFAULT_VERSION: &str = "latest";

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub version: String,
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(TypesError::InvalidImageRef(reference.to_string()));
        }

        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, version) = match reference[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&reference[..split], &reference[split + 1..])
            }
            None => (reference, DEFAULT_VERSION),
        };

        if name.is_empty() || version.is_empty() {
            return Err(TypesError::InvalidImageRef(reference.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
