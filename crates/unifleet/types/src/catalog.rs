//! Package catalog, build and packaging types

use crate::image::ImageRef;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Filter for a catalog lookup
///
/// Every field must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageQuery {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub architecture: String,

    /// Query the remote catalog instead of the local one
    pub remote: bool,
}

impl PackageQuery {
    pub fn local(image: &ImageRef, target: &Target) -> Self {
        Self {
            name: image.name.clone(),
            version: image.version.clone(),
            platform: target.platform.clone(),
            architecture: target.architecture.clone(),
            remote: false,
        }
    }

    pub fn remote(image: &ImageRef, target: &Target) -> Self {
        Self {
            remote: true,
            ..Self::local(image, target)
        }
    }

    pub fn matches(&self, package: &PackageInfo) -> bool {
        self.name == package.name
            && self.version == package.version
            && self.platform == package.platform
            && self.architecture == package.architecture
    }
}

/// A package known to a catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
    pub architecture: String,
    pub format: PackageFormat,
    pub size_bytes: u64,
}

impl PackageInfo {
    pub fn new(image: &ImageRef, target: &Target) -> Self {
        Self {
            name: image.name.clone(),
            version: image.version.clone(),
            platform: target.platform.clone(),
            architecture: target.architecture.clone(),
            format: PackageFormat::Oci,
            size_bytes: 0,
        }
    }

    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// On-disk package format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    #[default]
    Oci,
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageFormat::Oci => write!(f, "oci"),
        }
    }
}

/// Output of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Build context the artifact came from
    pub context: PathBuf,

    /// Path of the built kernel image
    pub kernel: PathBuf,

    pub target: Target,
}

/// Parameters for packaging a build artifact into the local catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOptions {
    /// Image reference to publish under
    pub name: String,
    pub format: PackageFormat,
    pub platform: String,
    pub architecture: String,

    /// Replace an existing package with the same reference
    pub overwrite: bool,
}
