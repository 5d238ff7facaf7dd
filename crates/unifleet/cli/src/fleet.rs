//! Driver wiring for the binary
//!
//! The binary is a simulation harness. It runs against the in-memory platform
//! and network drivers, registered as `qemu` and `firecracker`, and only the
//! composite state outlives the process, as JSON files under the state
//! directory.
//!
//! Every invocation starts with an empty fleet. A second `unifleet up` sees
//! none of the machines the first one launched, launches them again and
//! releases the old ids from the stored state. Skipping running services only
//! holds within one process, against drivers that keep their machines.

use crate::config::CliConfig;
use std::sync::Arc;
use unifleet_compose::{ArtifactResolver, ReconcileConfig, Reconciler};
use unifleet_drivers::{
    DriverRegistry, InMemoryBuilder, InMemoryCatalog, InMemoryMachineDriver,
    InMemoryNetworkDriver, InMemoryPackager, JsonFileComposeStore,
};

/// Platforms with a registered driver
pub const PLATFORMS: &[&str] = &["qemu", "firecracker"];

/// Every backend the commands need
pub struct Fleet {
    pub machines: DriverRegistry,
    pub networks: Arc<InMemoryNetworkDriver>,
    pub catalog: Arc<InMemoryCatalog>,
    pub builder: Arc<InMemoryBuilder>,
    pub packager: Arc<InMemoryPackager>,
    pub store: Arc<JsonFileComposeStore>,
}

impl Fleet {
    pub fn new(config: &CliConfig) -> Self {
        let mut machines = PLATFORMS.iter().fold(DriverRegistry::new(), |registry, platform| {
            registry.register(Arc::new(InMemoryMachineDriver::new(*platform)))
        });
        if let Some(platform) = &config.default_platform {
            machines = machines.with_default(platform.clone());
        }

        let catalog = Arc::new(InMemoryCatalog::new());
        Self {
            machines,
            networks: Arc::new(InMemoryNetworkDriver::new()),
            packager: Arc::new(InMemoryPackager::new(catalog.clone())),
            builder: Arc::new(InMemoryBuilder::new()),
            catalog,
            store: Arc::new(JsonFileComposeStore::new(config.compose_dir())),
        }
    }

    pub fn reconciler(&self, config: ReconcileConfig) -> Reconciler {
        let resolver = ArtifactResolver::new(
            self.catalog.clone(),
            self.builder.clone(),
            self.packager.clone(),
        );
        Reconciler::new(
            Arc::new(self.machines.clone()),
            self.networks.clone(),
            resolver,
            self.store.clone(),
            config,
        )
    }
}

/// Target for services that declare no platform: the configured default
/// platform (else the first registered) on the host architecture.
pub fn default_target(config: &CliConfig) -> String {
    let platform = config.default_platform.as_deref().unwrap_or(PLATFORMS[0]);
    format!("{platform}/{}", host_architecture())
}

/// Architecture name of the host, as used in platform targets
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "arm" => "arm",
        other => other,
    }
}
