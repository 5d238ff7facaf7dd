//! Package catalog, builder and packager traits

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use unifleet_types::{BuildArtifact, PackageInfo, PackageOptions, PackageQuery, Target};

/// Package catalog spanning the local store and a remote registry
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Find packages matching a query. `query.remote` selects the side.
    async fn query(&self, query: &PackageQuery) -> Result<Vec<PackageInfo>>;

    /// Copy a remote package into the local store
    async fn pull(&self, package: &PackageInfo) -> Result<()>;

    /// Publish a local package to the remote registry
    async fn push(&self, package: &PackageInfo) -> Result<()>;
}

/// Builds a unikernel from a build context
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, context: &Path, target: &Target) -> Result<BuildArtifact>;
}

/// Packages a build artifact into the local catalog
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        artifact: &BuildArtifact,
        options: &PackageOptions,
    ) -> Result<PackageInfo>;
}
