//! Platform driver selection
//!
//! The registry maps platform names to machine drivers. Used as a
//! `MachineDriver` itself it gives a fleet-wide view: listings are the union
//! of every driver, launches are routed by `request.platform`, and
//! name-addressed calls go to whichever driver knows the machine.

use crate::error::{DriverError, ResourceKind, Result};
use crate::machine::{MachineDriver, MachineEvents};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use unifleet_types::{LaunchRequest, Machine};

/// Platform name that asks the registry to pick a driver
pub const AUTO_PLATFORM: &str = "auto";

/// Registry of machine drivers keyed by platform name
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn MachineDriver>>,
    default_platform: Option<String>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own platform name, replacing any previous one.
    pub fn register(mut self, driver: Arc<dyn MachineDriver>) -> Self {
        self.drivers.insert(driver.platform().to_string(), driver);
        self
    }

    /// Platform chosen by `detect` when several drivers are registered.
    pub fn with_default(mut self, platform: impl Into<String>) -> Self {
        self.default_platform = Some(platform.into());
        self
    }

    /// Look up a driver by platform name.
    pub fn get(&self, platform: &str) -> Result<Arc<dyn MachineDriver>> {
        if platform == AUTO_PLATFORM {
            return self.detect();
        }
        self.drivers
            .get(platform)
            .cloned()
            .ok_or_else(|| DriverError::UnsupportedPlatform(platform.to_string()))
    }

    /// Pick the host's driver: the configured default, else the first registered.
    pub fn detect(&self) -> Result<Arc<dyn MachineDriver>> {
        if let Some(platform) = &self.default_platform {
            if let Some(driver) = self.drivers.get(platform) {
                return Ok(driver.clone());
            }
        }
        self.drivers
            .values()
            .next()
            .cloned()
            .ok_or(DriverError::NoPlatform)
    }

    /// Registered platform names, sorted.
    pub fn platforms(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    async fn locate(&self, name: &str) -> Result<Option<Arc<dyn MachineDriver>>> {
        for driver in self.drivers.values() {
            if driver.get(name).await?.is_some() {
                return Ok(Some(driver.clone()));
            }
        }
        Ok(None)
    }

    async fn require(&self, name: &str) -> Result<Arc<dyn MachineDriver>> {
        self.locate(name)
            .await?
            .ok_or_else(|| DriverError::not_found(ResourceKind::Machine, name))
    }
}

#[async_trait]
impl MachineDriver for DriverRegistry {
    fn platform(&self) -> &str {
        AUTO_PLATFORM
    }

    async fn list(&self) -> Result<Vec<Machine>> {
        let mut machines = Vec::new();
        for driver in self.drivers.values() {
            machines.extend(driver.list().await?);
        }
        Ok(machines)
    }

    async fn get(&self, name: &str) -> Result<Option<Machine>> {
        for driver in self.drivers.values() {
            if let Some(machine) = driver.get(name).await? {
                return Ok(Some(machine));
            }
        }
        Ok(None)
    }

    async fn launch(&self, request: LaunchRequest) -> Result<Machine> {
        let driver = self.get(&request.platform)?;
        debug!(
            machine = %request.name,
            platform = %driver.platform(),
            "Routing launch"
        );
        driver.launch(request).await
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.require(name).await?.stop(name).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.require(name).await?.remove(name).await
    }

    async fn watch(&self, machine: &Machine, cancel: CancellationToken) -> Result<MachineEvents> {
        self.get(&machine.platform)?.watch(machine, cancel).await
    }

    async fn logs(
        &self,
        name: &str,
        follow: bool,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<String>> {
        self.require(name).await?.logs(name, follow, cancel).await
    }
}
