//! Artifact resolution
//!
//! Finds or produces the artifact a service is launched from. The policy is
//! evaluated in order and stops at the first success:
//!
//! 1. exact match in the local catalog (no network access)
//! 2. exact match in the remote catalog, pulled into the local one
//! 3. build the service's context and package it under the image reference
//!
//! A service without an image reference is built and launched straight from
//! its build context.

use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use unifleet_drivers::{Builder, Catalog, Packager};
use unifleet_types::{
    BuildArtifact, ImageRef, PackageFormat, PackageOptions, PackageQuery, Service, Target,
};

/// Where a resolved artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSource {
    Local,
    Pulled,
    Built,
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSource::Local => write!(f, "local"),
            ArtifactSource::Pulled => write!(f, "pulled"),
            ArtifactSource::Built => write!(f, "built"),
        }
    }
}

/// An artifact ready to launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    /// Value passed to the machine driver as the launch artifact
    pub artifact: String,
    pub source: ArtifactSource,
}

/// Resolves service artifacts through the catalog, builder and packager
#[derive(Clone)]
pub struct ArtifactResolver {
    catalog: Arc<dyn Catalog>,
    builder: Arc<dyn Builder>,
    packager: Arc<dyn Packager>,
}

impl ArtifactResolver {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        builder: Arc<dyn Builder>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            catalog,
            builder,
            packager,
        }
    }

    /// Make the artifact of `service` available locally.
    #[instrument(skip(self, service), fields(service = %service.name))]
    pub async fn resolve(&self, service: &Service) -> Result<ResolvedArtifact> {
        let target = service.target()?;

        let Some(image) = service.image_ref()? else {
            let artifact = self.build(service).await?;
            return Ok(ResolvedArtifact {
                artifact: artifact.context.display().to_string(),
                source: ArtifactSource::Built,
            });
        };

        // 1. Local catalog
        let local = self
            .catalog
            .query(&PackageQuery::local(&image, &target))
            .await
            .map_err(|e| ComposeError::resolution(&service.name, e))?;
        if !local.is_empty() {
            debug!(image = %image, "Found package in local catalog");
            return Ok(ResolvedArtifact {
                artifact: image.to_string(),
                source: ArtifactSource::Local,
            });
        }

        // 2. Remote catalog
        let remote = self
            .catalog
            .query(&PackageQuery::remote(&image, &target))
            .await
            .map_err(|e| ComposeError::resolution(&service.name, e))?;
        if let Some(package) = remote.first() {
            info!(image = %image, size_bytes = package.size_bytes, "Pulling package");
            self.catalog
                .pull(package)
                .await
                .map_err(|e| ComposeError::resolution(&service.name, e))?;
            return Ok(ResolvedArtifact {
                artifact: image.to_string(),
                source: ArtifactSource::Pulled,
            });
        }

        // 3. Build and package
        if service.build_context().is_some() {
            let artifact = self.build(service).await?;
            self.package(service, &image, &target, &artifact).await?;
            return Ok(ResolvedArtifact {
                artifact: image.to_string(),
                source: ArtifactSource::Built,
            });
        }

        Err(ComposeError::Unresolvable {
            service: service.name.clone(),
        })
    }

    /// Build the service's context for its target.
    #[instrument(skip(self, service), fields(service = %service.name))]
    pub async fn build(&self, service: &Service) -> Result<BuildArtifact> {
        let target = service.target()?;
        let context = service
            .build_context()
            .ok_or_else(|| ComposeError::Unresolvable {
                service: service.name.clone(),
            })?;

        info!(context = %context.display(), target = %target, "Building");
        self.builder
            .build(context, &target)
            .await
            .map_err(|e| ComposeError::resolution(&service.name, e))
    }

    async fn package(
        &self,
        service: &Service,
        image: &ImageRef,
        target: &Target,
        artifact: &BuildArtifact,
    ) -> Result<()> {
        let options = PackageOptions {
            name: image.to_string(),
            format: PackageFormat::Oci,
            platform: target.platform.clone(),
            architecture: target.architecture.clone(),
            overwrite: true,
        };
        let package = self
            .packager
            .package(artifact, &options)
            .await
            .map_err(|e| ComposeError::resolution(&service.name, e))?;
        debug!(package = %package.reference(), format = %package.format, "Packaged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unifleet_drivers::{InMemoryBuilder, InMemoryCatalog, InMemoryPackager};
    use unifleet_types::PackageInfo;

    struct Harness {
        catalog: Arc<InMemoryCatalog>,
        builder: Arc<InMemoryBuilder>,
        packager: Arc<InMemoryPackager>,
        resolver: ArtifactResolver,
    }

    fn harness() -> Harness {
        let catalog = Arc::new(InMemoryCatalog::new());
        let builder = Arc::new(InMemoryBuilder::new());
        let packager = Arc::new(InMemoryPackager::new(catalog.clone()));
        let resolver = ArtifactResolver::new(catalog.clone(), builder.clone(), packager.clone());
        Harness {
            catalog,
            builder,
            packager,
            resolver,
        }
    }

    fn package(reference: &str) -> PackageInfo {
        PackageInfo::new(
            &ImageRef::parse(reference).unwrap(),
            &Target::new("qemu", "x86_64"),
        )
    }

    #[tokio::test]
    async fn test_local_hit_never_touches_remote() {
        let h = harness();
        h.catalog.add_local(package("org/app:1.0"));

        let service = Service::new("web", "qemu/x86_64").with_image("org/app:1.0");
        let resolved = h.resolver.resolve(&service).await.unwrap();

        assert_eq!(resolved.source, ArtifactSource::Local);
        assert_eq!(resolved.artifact, "org/app:1.0");
        assert!(!h.catalog.touched_remote());
    }

    #[tokio::test]
    async fn test_untagged_image_resolves_latest() {
        let h = harness();
        h.catalog.add_local(package("org/app:latest"));

        let service = Service::new("web", "qemu/x86_64").with_image("org/app");
        let resolved = h.resolver.resolve(&service).await.unwrap();
        assert_eq!(resolved.artifact, "org/app:latest");
    }

    #[tokio::test]
    async fn test_remote_hit_is_pulled() {
        let h = harness();
        h.catalog.add_remote(package("org/app:latest"));

        let service = Service::new("web", "qemu/x86_64").with_image("org/app:latest");
        let resolved = h.resolver.resolve(&service).await.unwrap();

        assert_eq!(resolved.source, ArtifactSource::Pulled);
        assert!(h.catalog.contains_local(&package("org/app:latest")));
    }

    #[tokio::test]
    async fn test_other_architecture_does_not_match() {
        let h = harness();
        h.catalog.add_local(package("org/app:latest"));

        let service = Service::new("web", "qemu/arm64").with_image("org/app:latest");
        let err = h.resolver.resolve(&service).await.unwrap_err();
        assert!(matches!(err, ComposeError::Unresolvable { .. }));
    }

    #[tokio::test]
    async fn test_build_and_package_when_no_catalog_hit() {
        let h = harness();
        let service = Service::new("web", "qemu/x86_64")
            .with_image("org/app:dev")
            .with_build("/src/app");

        let resolved = h.resolver.resolve(&service).await.unwrap();

        assert_eq!(resolved.source, ArtifactSource::Built);
        assert_eq!(h.builder.builds().len(), 1);
        let packaged = h.packager.packaged();
        assert_eq!(packaged.len(), 1);
        assert_eq!(packaged[0].name, "org/app:dev");
        assert!(packaged[0].overwrite);
        assert!(h.catalog.contains_local(&package("org/app:dev")));
    }

    #[tokio::test]
    async fn test_no_image_builds_from_context() {
        let h = harness();
        let service = Service::new("web", "qemu/x86_64").with_build("/src/app");

        let resolved = h.resolver.resolve(&service).await.unwrap();
        assert_eq!(resolved.artifact, "/src/app");
        assert!(h.packager.packaged().is_empty());
        assert!(h.catalog.queries().is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_is_a_resolution_error() {
        let h = harness();
        h.builder.fail_build("/src/app", "missing build manifest");
        let service = Service::new("web", "qemu/x86_64").with_build("/src/app");

        let err = h.resolver.resolve(&service).await.unwrap_err();
        assert!(matches!(err, ComposeError::Resolution { ref service, .. } if service == "web"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_pull_failure_is_not_retried() {
        let h = harness();
        h.catalog.add_remote(package("org/app:latest"));
        h.catalog.fail_pull("org/app:latest");

        let service = Service::new("web", "qemu/x86_64")
            .with_image("org/app:latest")
            .with_build("/src/app");
        assert!(h.resolver.resolve(&service).await.is_err());
        assert_eq!(h.catalog.pulls().len(), 1);
        assert!(h.builder.builds().is_empty());
    }
}
