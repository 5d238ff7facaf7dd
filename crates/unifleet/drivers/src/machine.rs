//! Machine driver trait
//!
//! One `MachineDriver` exists per platform (qemu, firecracker, ...). The
//! driver owns machine state; callers only observe it through `list`, `get`
//! and `watch`.

use crate::error::{DriverError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use unifleet_types::{LaunchRequest, Machine};

/// Event stream for a single machine
///
/// `events` carries a fresh snapshot every time the machine changes.
/// `errors` carries at most a few stream failures. Both channels close when
/// the stream ends or the cancellation token passed to `watch` fires.
pub struct MachineEvents {
    pub events: mpsc::Receiver<Machine>,
    pub errors: mpsc::Receiver<DriverError>,
}

/// Platform driver for machines
#[async_trait]
pub trait MachineDriver: Send + Sync {
    /// Platform name this driver serves
    fn platform(&self) -> &str;

    /// List every machine known to the driver
    async fn list(&self) -> Result<Vec<Machine>>;

    /// Get a machine by name
    async fn get(&self, name: &str) -> Result<Option<Machine>>;

    /// Launch a new machine
    async fn launch(&self, request: LaunchRequest) -> Result<Machine>;

    /// Stop a machine, leaving it in place
    async fn stop(&self, name: &str) -> Result<()>;

    /// Remove a machine
    async fn remove(&self, name: &str) -> Result<()>;

    /// Subscribe to state changes of one machine
    async fn watch(&self, machine: &Machine, cancel: CancellationToken) -> Result<MachineEvents>;

    /// Stream console output of a machine
    async fn logs(
        &self,
        name: &str,
        follow: bool,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<String>>;
}
