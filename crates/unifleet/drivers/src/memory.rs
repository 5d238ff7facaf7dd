//! In-memory implementations of the driver traits
//!
//! These back local simulation and the engine tests. Each keeps a journal of
//! the mutating calls it received and can be told to fail specific calls.

use crate::catalog::{Builder, Catalog, Packager};
use crate::error::{DriverError, ResourceKind, Result};
use crate::machine::{MachineDriver, MachineEvents};
use crate::network::NetworkDriver;
use crate::registry::AUTO_PLATFORM;
use crate::store::ComposeStore;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use unifleet_types::{
    BuildArtifact, CompositeState, CompositeUpdate, CreateNetworkRequest, ImageRef,
    LaunchRequest, Machine, MachineId, MachineState, Network, NetworkId, NetworkState,
    PackageInfo, PackageOptions, PackageQuery, Target,
};

fn journal<T: Clone>(entries: &Mutex<Vec<T>>) -> Vec<T> {
    entries
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn record<T>(entries: &Mutex<Vec<T>>, entry: T) {
    entries
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(entry);
}

// ═══════════════════════════════════════════════════════════════════════════
// MACHINES
// ═══════════════════════════════════════════════════════════════════════════

/// Fault injected into a machine event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    /// Stream ends on a message that is not an event
    NonEvent,

    /// Stream breaks with an error
    Broken(String),
}

impl StreamFault {
    fn into_error(self) -> DriverError {
        match self {
            StreamFault::NonEvent => DriverError::NonEventStreamEnd,
            StreamFault::Broken(reason) => DriverError::Stream(reason),
        }
    }
}

#[derive(Debug, Clone)]
enum Change {
    State(Machine),
    Fault(StreamFault),
    Removed,
}

#[derive(Debug, Clone)]
struct MachineUpdate {
    id: MachineId,
    change: Change,
}

/// In-memory machine driver for one platform
pub struct InMemoryMachineDriver {
    platform: String,
    launch_state: MachineState,
    machines: DashMap<String, Machine>,
    consoles: DashMap<String, Vec<String>>,
    updates: broadcast::Sender<MachineUpdate>,
    failing_launches: DashMap<String, String>,
    failing_watches: DashSet<String>,
    failing_list: AtomicBool,
    launches: Mutex<Vec<LaunchRequest>>,
    removals: Mutex<Vec<String>>,
    watch_calls: AtomicUsize,
}

impl InMemoryMachineDriver {
    pub fn new(platform: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            platform: platform.into(),
            launch_state: MachineState::Running,
            machines: DashMap::new(),
            consoles: DashMap::new(),
            updates,
            failing_launches: DashMap::new(),
            failing_watches: DashSet::new(),
            failing_list: AtomicBool::new(false),
            launches: Mutex::new(Vec::new()),
            removals: Mutex::new(Vec::new()),
            watch_calls: AtomicUsize::new(0),
        }
    }

    /// State newly launched machines start in (default: running)
    pub fn with_launch_state(mut self, state: MachineState) -> Self {
        self.launch_state = state;
        self
    }

    /// Add a machine that already exists on this platform.
    pub fn seed(&self, name: &str, state: MachineState) -> Machine {
        let machine = Machine {
            id: MachineId::generate(),
            name: name.to_string(),
            platform: self.platform.clone(),
            architecture: "x86_64".to_string(),
            artifact: format!("{name}:latest"),
            state,
            networks: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        self.machines.insert(name.to_string(), machine.clone());
        machine
    }

    /// Change the state of a machine and notify its watchers.
    pub fn set_state(&self, name: &str, state: MachineState) -> Option<Machine> {
        let machine = {
            let mut entry = self.machines.get_mut(name)?;
            entry.state = state;
            entry.clone()
        };
        self.publish(&machine.id, Change::State(machine.clone()));
        Some(machine)
    }

    /// Push a fault into the event streams of a machine.
    pub fn inject_fault(&self, name: &str, fault: StreamFault) -> bool {
        let Some(id) = self.machines.get(name).map(|m| m.id.clone()) else {
            return false;
        };
        self.publish(&id, Change::Fault(fault));
        true
    }

    /// Append a console line for `logs`.
    pub fn push_log(&self, name: &str, line: impl Into<String>) {
        self.consoles
            .entry(name.to_string())
            .or_default()
            .push(line.into());
    }

    pub fn fail_launch(&self, name: &str, reason: impl Into<String>) {
        self.failing_launches.insert(name.to_string(), reason.into());
    }

    pub fn fail_watch(&self, name: &str) {
        self.failing_watches.insert(name.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.failing_list.store(fail, Ordering::SeqCst);
    }

    /// Launch requests received, in order
    pub fn launches(&self) -> Vec<LaunchRequest> {
        journal(&self.launches)
    }

    /// Names removed, in order
    pub fn removals(&self) -> Vec<String> {
        journal(&self.removals)
    }

    /// Number of attempts to open an event stream
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    fn publish(&self, id: &MachineId, change: Change) {
        // No receivers just means nobody is watching.
        let _ = self.updates.send(MachineUpdate {
            id: id.clone(),
            change,
        });
    }
}

#[async_trait]
impl MachineDriver for InMemoryMachineDriver {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn list(&self) -> Result<Vec<Machine>> {
        if self.failing_list.load(Ordering::SeqCst) {
            return Err(DriverError::Platform(format!(
                "{}: could not list machines",
                self.platform
            )));
        }
        let mut machines: Vec<Machine> = self.machines.iter().map(|m| m.value().clone()).collect();
        machines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(machines)
    }

    async fn get(&self, name: &str) -> Result<Option<Machine>> {
        Ok(self.machines.get(name).map(|m| m.clone()))
    }

    async fn launch(&self, request: LaunchRequest) -> Result<Machine> {
        if request.platform != self.platform && request.platform != AUTO_PLATFORM {
            return Err(DriverError::UnsupportedPlatform(request.platform));
        }
        record(&self.launches, request.clone());

        if let Some(reason) = self.failing_launches.get(&request.name) {
            return Err(DriverError::Platform(reason.clone()));
        }
        if self.machines.contains_key(&request.name) {
            return Err(DriverError::already_exists(ResourceKind::Machine, request.name));
        }

        let machine = Machine {
            id: MachineId::generate(),
            name: request.name.clone(),
            platform: self.platform.clone(),
            architecture: request.architecture,
            artifact: request.artifact,
            state: self.launch_state,
            networks: request.networks,
            created_at: chrono::Utc::now(),
        };
        self.machines.insert(request.name, machine.clone());
        self.publish(&machine.id, Change::State(machine.clone()));

        debug!(
            machine_id = %machine.id,
            name = %machine.name,
            platform = %self.platform,
            "Machine launched"
        );
        Ok(machine)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.set_state(name, MachineState::Exited)
            .map(|_| ())
            .ok_or_else(|| DriverError::not_found(ResourceKind::Machine, name))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let (_, machine) = self
            .machines
            .remove(name)
            .ok_or_else(|| DriverError::not_found(ResourceKind::Machine, name))?;
        self.consoles.remove(name);
        record(&self.removals, name.to_string());
        self.publish(&machine.id, Change::Removed);
        Ok(())
    }

    async fn watch(&self, machine: &Machine, cancel: CancellationToken) -> Result<MachineEvents> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_watches.contains(&machine.name) {
            return Err(DriverError::Stream(format!(
                "could not open event stream of {}",
                machine.name
            )));
        }

        let mut updates = self.updates.subscribe();
        let (event_tx, events) = mpsc::channel(32);
        let (error_tx, errors) = mpsc::channel(4);
        let id = machine.id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = updates.recv() => match update {
                        Ok(update) if update.id == id => match update.change {
                            Change::State(machine) => {
                                if event_tx.send(machine).await.is_err() {
                                    break;
                                }
                            }
                            Change::Fault(fault) => {
                                let _ = error_tx.send(fault.into_error()).await;
                                break;
                            }
                            Change::Removed => break,
                        },
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(machine_id = %id, missed, "Event stream lagged");
                            let _ = error_tx
                                .send(DriverError::Stream(format!("missed {missed} updates")))
                                .await;
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(MachineEvents { events, errors })
    }

    async fn logs(
        &self,
        name: &str,
        _follow: bool,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<String>> {
        if !self.machines.contains_key(name) {
            return Err(DriverError::not_found(ResourceKind::Machine, name));
        }
        // In-memory consoles are finite, so follow ends with the buffer.
        let lines = self.consoles.get(name).map(|l| l.clone()).unwrap_or_default();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for line in lines {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(line) => if sent.is_err() { break },
                }
            }
        });
        Ok(rx)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NETWORKS
// ═══════════════════════════════════════════════════════════════════════════

/// In-memory network driver
pub struct InMemoryNetworkDriver {
    networks: DashMap<String, Network>,
    failing: DashMap<String, String>,
    created: Mutex<Vec<CreateNetworkRequest>>,
}

impl InMemoryNetworkDriver {
    pub fn new() -> Self {
        Self {
            networks: DashMap::new(),
            failing: DashMap::new(),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Add a network that already exists on the host.
    pub fn seed(&self, name: &str, subnet: Option<&str>) -> Network {
        let network = Network {
            id: NetworkId::generate(),
            name: name.to_string(),
            driver: unifleet_types::DEFAULT_NETWORK_DRIVER.to_string(),
            subnet: subnet.map(str::to_string),
            state: NetworkState::Up,
        };
        self.networks.insert(name.to_string(), network.clone());
        network
    }

    pub fn fail_create(&self, name: &str, reason: impl Into<String>) {
        self.failing.insert(name.to_string(), reason.into());
    }

    /// Create requests received, in order
    pub fn created(&self) -> Vec<CreateNetworkRequest> {
        journal(&self.created)
    }
}

impl Default for InMemoryNetworkDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkDriver for InMemoryNetworkDriver {
    async fn create(&self, request: CreateNetworkRequest) -> Result<Network> {
        record(&self.created, request.clone());

        if let Some(reason) = self.failing.get(&request.name) {
            return Err(DriverError::Network(reason.clone()));
        }
        if self.networks.contains_key(&request.name) {
            return Err(DriverError::already_exists(ResourceKind::Network, request.name));
        }

        let network = Network {
            id: NetworkId::generate(),
            name: request.name.clone(),
            driver: request.driver,
            subnet: request.subnet,
            state: NetworkState::Up,
        };
        self.networks.insert(request.name, network.clone());
        Ok(network)
    }

    async fn get(&self, name: &str) -> Result<Option<Network>> {
        Ok(self.networks.get(name).map(|n| n.clone()))
    }

    async fn list(&self) -> Result<Vec<Network>> {
        let mut networks: Vec<Network> = self.networks.iter().map(|n| n.value().clone()).collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DriverError::not_found(ResourceKind::Network, name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CATALOG, BUILD, PACKAGING
// ═══════════════════════════════════════════════════════════════════════════

fn package_key(name: &str, version: &str, platform: &str, architecture: &str) -> String {
    format!("{name}:{version}@{platform}/{architecture}")
}

fn key_of(package: &PackageInfo) -> String {
    package_key(
        &package.name,
        &package.version,
        &package.platform,
        &package.architecture,
    )
}

/// In-memory catalog with a local store and a remote registry
pub struct InMemoryCatalog {
    local: DashMap<String, PackageInfo>,
    remote: DashMap<String, PackageInfo>,
    failing_pulls: DashSet<String>,
    queries: Mutex<Vec<PackageQuery>>,
    pulls: Mutex<Vec<String>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            local: DashMap::new(),
            remote: DashMap::new(),
            failing_pulls: DashSet::new(),
            queries: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
        }
    }

    pub fn add_local(&self, package: PackageInfo) {
        self.local.insert(key_of(&package), package);
    }

    pub fn add_remote(&self, package: PackageInfo) {
        self.remote.insert(key_of(&package), package);
    }

    pub fn contains_local(&self, package: &PackageInfo) -> bool {
        self.local.contains_key(&key_of(package))
    }

    /// Make pulls of `reference` (`name:version`) fail.
    pub fn fail_pull(&self, reference: &str) {
        self.failing_pulls.insert(reference.to_string());
    }

    /// Queries received, in order
    pub fn queries(&self) -> Vec<PackageQuery> {
        journal(&self.queries)
    }

    /// References pulled, in order
    pub fn pulls(&self) -> Vec<String> {
        journal(&self.pulls)
    }

    /// True when any remote query has been made.
    pub fn touched_remote(&self) -> bool {
        self.queries().iter().any(|q| q.remote)
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn query(&self, query: &PackageQuery) -> Result<Vec<PackageInfo>> {
        record(&self.queries, query.clone());
        let side = if query.remote { &self.remote } else { &self.local };
        Ok(side
            .iter()
            .filter(|p| query.matches(p.value()))
            .map(|p| p.value().clone())
            .collect())
    }

    async fn pull(&self, package: &PackageInfo) -> Result<()> {
        let reference = package.reference();
        record(&self.pulls, reference.clone());

        if self.failing_pulls.contains(&reference) {
            return Err(DriverError::Catalog(format!("pull of {reference} failed")));
        }
        let key = key_of(package);
        let remote = self
            .remote
            .get(&key)
            .map(|p| p.clone())
            .ok_or_else(|| DriverError::not_found(ResourceKind::Package, reference))?;
        self.local.insert(key, remote);
        Ok(())
    }

    async fn push(&self, package: &PackageInfo) -> Result<()> {
        let key = key_of(package);
        let local = self
            .local
            .get(&key)
            .map(|p| p.clone())
            .ok_or_else(|| DriverError::not_found(ResourceKind::Package, package.reference()))?;
        self.remote.insert(key, local);
        Ok(())
    }
}

/// In-memory builder producing a kernel path under the build context
pub struct InMemoryBuilder {
    failing: DashMap<PathBuf, String>,
    builds: Mutex<Vec<(PathBuf, Target)>>,
}

impl InMemoryBuilder {
    pub fn new() -> Self {
        Self {
            failing: DashMap::new(),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_build(&self, context: impl Into<PathBuf>, reason: impl Into<String>) {
        self.failing.insert(context.into(), reason.into());
    }

    /// Builds run, in order
    pub fn builds(&self) -> Vec<(PathBuf, Target)> {
        journal(&self.builds)
    }
}

impl Default for InMemoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Builder for InMemoryBuilder {
    async fn build(&self, context: &Path, target: &Target) -> Result<BuildArtifact> {
        record(&self.builds, (context.to_path_buf(), target.clone()));

        if let Some(reason) = self.failing.get(context) {
            return Err(DriverError::Build(reason.clone()));
        }
        Ok(BuildArtifact {
            context: context.to_path_buf(),
            kernel: context
                .join(".unifleet")
                .join("build")
                .join(format!("{}-{}", target.platform, target.architecture)),
            target: target.clone(),
        })
    }
}

/// In-memory packager publishing into an `InMemoryCatalog`'s local store
pub struct InMemoryPackager {
    catalog: Arc<InMemoryCatalog>,
    failing: DashMap<String, String>,
    packaged: Mutex<Vec<PackageOptions>>,
}

impl InMemoryPackager {
    pub fn new(catalog: Arc<InMemoryCatalog>) -> Self {
        Self {
            catalog,
            failing: DashMap::new(),
            packaged: Mutex::new(Vec::new()),
        }
    }

    /// Make packaging under `name` fail.
    pub fn fail_package(&self, name: &str, reason: impl Into<String>) {
        self.failing.insert(name.to_string(), reason.into());
    }

    /// Packaging requests received, in order
    pub fn packaged(&self) -> Vec<PackageOptions> {
        journal(&self.packaged)
    }
}

#[async_trait]
impl Packager for InMemoryPackager {
    async fn package(
        &self,
        artifact: &BuildArtifact,
        options: &PackageOptions,
    ) -> Result<PackageInfo> {
        record(&self.packaged, options.clone());

        if let Some(reason) = self.failing.get(&options.name) {
            return Err(DriverError::Package(reason.clone()));
        }
        let image =
            ImageRef::parse(&options.name).map_err(|e| DriverError::Package(e.to_string()))?;
        let target = Target::new(&options.platform, &options.architecture);

        let mut package = PackageInfo::new(&image, &target);
        package.format = options.format;
        if self.catalog.contains_local(&package) && !options.overwrite {
            return Err(DriverError::already_exists(
                ResourceKind::Package,
                package.reference(),
            ));
        }

        debug!(
            package = %package.reference(),
            kernel = %artifact.kernel.display(),
            "Packaged build artifact"
        );
        self.catalog.add_local(package.clone());
        Ok(package)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPOSITE STATE
// ═══════════════════════════════════════════════════════════════════════════

/// In-memory compose store
pub struct InMemoryComposeStore {
    states: DashMap<String, CompositeState>,
    failing: AtomicBool,
    updates: AtomicUsize,
}

impl InMemoryComposeStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            failing: AtomicBool::new(false),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Number of successful updates
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryComposeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComposeStore for InMemoryComposeStore {
    async fn get(&self, project: &str) -> Result<Option<CompositeState>> {
        Ok(self.states.get(project).map(|s| s.clone()))
    }

    async fn update(&self, update: CompositeUpdate) -> Result<CompositeState> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DriverError::Store(format!(
                "could not write state of {}",
                update.state.project
            )));
        }
        let mut entry = self
            .states
            .entry(update.state.project.clone())
            .or_insert_with(|| update.state.clone());
        let merged = update.apply(Some(entry.clone()));
        *entry = merged.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(merged)
    }

    async fn delete(&self, project: &str) -> Result<()> {
        self.states.remove(project);
        Ok(())
    }
}
