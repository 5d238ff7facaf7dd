//! Reconciliation engine
//!
//! One `up` call is one reconciliation pass. Networks are settled before any
//! machine is touched; services are processed in declaration order and fail
//! independently; the composite state is written exactly once per pass.

use crate::config::ReconcileConfig;
use crate::error::{ComposeError, Result};
use crate::logs::{log_prefix, LogSink, TracingLogSink};
use crate::report::{NetworkFailure, ServiceOutcome, ServiceReport, UpReport};
use crate::resolver::ArtifactResolver;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use unifleet_drivers::{ComposeStore, MachineDriver, NetworkDriver};
use unifleet_types::{
    CompositeState, CompositeUpdate, CreateNetworkRequest, EventSource, FleetEvent,
    FleetEventEnvelope, LaunchRequest, Machine, NetworkSpec, NetworkState, Project,
    ResourceRef, Service,
};

/// Brings projects up against a set of drivers
pub struct Reconciler {
    machines: Arc<dyn MachineDriver>,
    networks: Arc<dyn NetworkDriver>,
    resolver: ArtifactResolver,
    store: Arc<dyn ComposeStore>,
    sink: Arc<dyn LogSink>,
    config: ReconcileConfig,
    event_tx: broadcast::Sender<FleetEventEnvelope>,
}

/// Live resources seen or produced during one pass
struct PassState {
    owned: CompositeState,
    live_networks: HashSet<String>,
    live_machines: HashSet<String>,
}

impl Reconciler {
    pub fn new(
        machines: Arc<dyn MachineDriver>,
        networks: Arc<dyn NetworkDriver>,
        resolver: ArtifactResolver,
        store: Arc<dyn ComposeStore>,
        config: ReconcileConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            machines,
            networks,
            resolver,
            store,
            sink: Arc::new(TracingLogSink),
            config,
            event_tx,
        }
    }

    /// Send followed console lines to `sink` instead of the tracing output.
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Subscribe to reconcile events
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Run one reconciliation pass for `project`.
    #[instrument(skip(self, project, cancel), fields(project = %project.name))]
    pub async fn up(&self, mut project: Project, cancel: CancellationToken) -> Result<UpReport> {
        // 1. Validate and address
        project.validate()?;
        project.assign_ips()?;

        let mut owned = CompositeState::new(&project.name, &project.working_dir);
        if let Some(composefile) = project.primary_compose_file() {
            owned = owned.with_composefile(composefile);
        }

        let existing_networks = self.networks.list().await.map_err(|source| {
            ComposeError::Listing {
                what: "networks",
                source,
            }
        })?;
        let existing_machines = self.machines.list().await.map_err(|source| {
            ComposeError::Listing {
                what: "machines",
                source,
            }
        })?;

        let mut pass = PassState {
            owned,
            live_networks: existing_networks.iter().map(|n| n.id.to_string()).collect(),
            live_machines: existing_machines.iter().map(|m| m.id.to_string()).collect(),
        };
        let mut report = UpReport {
            project: project.name.clone(),
            networks_created: Vec::new(),
            networks_failed: Vec::new(),
            services: Vec::new(),
            released: Vec::new(),
            state: pass.owned.clone(),
        };

        // 2. Networks, subnet-bearing first
        let present: HashSet<&str> = existing_networks.iter().map(|n| n.name.as_str()).collect();
        for spec in project.ordered_networks() {
            if present.contains(spec.name.as_str()) {
                debug!(network = %spec.name, "Network already present");
                continue;
            }
            match self.create_network(spec, &mut pass).await {
                Ok(()) => {
                    report.networks_created.push(spec.name.clone());
                    self.emit(
                        &project.name,
                        FleetEvent::NetworkCreated {
                            network: spec.name.clone(),
                        },
                    );
                }
                Err(e) => {
                    error!(network = %spec.name, error = %e, "Could not create network");
                    self.emit(
                        &project.name,
                        FleetEvent::NetworkFailed {
                            network: spec.name.clone(),
                            reason: e.to_string(),
                        },
                    );
                    report.networks_failed.push(NetworkFailure {
                        network: spec.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // 3. Services, in declaration order
        let by_name: HashMap<&str, &Machine> = existing_machines
            .iter()
            .map(|m| (m.name.as_str(), m))
            .collect();
        for service in &project.services {
            let outcome = match self
                .bring_up(&project, service, by_name.get(service.name.as_str()).copied(), &mut pass)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(service = %service.name, error = %e, "Service failed");
                    self.emit(
                        &project.name,
                        FleetEvent::ServiceFailed {
                            service: service.name.clone(),
                            reason: e.to_string(),
                        },
                    );
                    ServiceOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.services.push(ServiceReport {
                service: service.name.clone(),
                outcome,
            });
        }

        // 4. Persist once
        let (state, released) = self.persist(&project, pass).await?;
        report.released = released;
        report.state = state;
        self.emit(
            &project.name,
            FleetEvent::StatePersisted {
                networks: report.state.networks.len(),
                machines: report.state.machines.len(),
            },
        );

        // 5. Follow consoles
        if self.config.follow_logs {
            self.follow_logs(&project, &cancel).await;
        }

        let failed = report.failed_services();
        info!(
            launched = report.launched(),
            failed = failed.len(),
            networks_created = report.networks_created.len(),
            "Reconciliation finished"
        );

        if self.config.strict && !failed.is_empty() {
            return Err(ComposeError::ServicesFailed { failed });
        }
        Ok(report)
    }

    async fn create_network(&self, spec: &NetworkSpec, pass: &mut PassState) -> Result<()> {
        let driver = spec
            .driver_or(&self.config.default_network_driver)
            .to_string();
        let request = CreateNetworkRequest {
            name: spec.name.clone(),
            driver,
            subnet: spec.subnet.clone(),
        };

        info!(network = %spec.name, subnet = ?spec.subnet, "Creating network");
        self.networks
            .create(request)
            .await
            .map_err(|e| ComposeError::driver(format!("network {}", spec.name), e))?;

        let network = self
            .networks
            .get(&spec.name)
            .await
            .map_err(|e| ComposeError::driver(format!("network {}", spec.name), e))?;

        match network {
            Some(network) => {
                pass.live_networks.insert(network.id.to_string());
                if network.state == NetworkState::Up {
                    pass.owned.add_network(ResourceRef::from(&network));
                } else {
                    warn!(network = %spec.name, state = %network.state, "Network is not up");
                }
            }
            None => warn!(network = %spec.name, "Network vanished after creation"),
        }
        Ok(())
    }

    async fn bring_up(
        &self,
        project: &Project,
        service: &Service,
        existing: Option<&Machine>,
        pass: &mut PassState,
    ) -> Result<ServiceOutcome> {
        if let Some(machine) = existing {
            if machine.state.is_running() {
                debug!(service = %service.name, machine_id = %machine.id, "Already running");
                pass.owned.add_machine(ResourceRef::from(machine));
                self.emit(
                    &project.name,
                    FleetEvent::ServiceSkipped {
                        service: service.name.clone(),
                        machine_id: machine.id.clone(),
                    },
                );
                return Ok(ServiceOutcome::AlreadyRunning {
                    machine_id: machine.id.clone(),
                });
            }

            info!(
                service = %service.name,
                machine_id = %machine.id,
                state = %machine.state,
                "Removing stale machine"
            );
            self.machines
                .remove(&service.name)
                .await
                .map_err(|e| ComposeError::driver(format!("machine {}", service.name), e))?;
            pass.live_machines.remove(machine.id.as_str());
            self.emit(
                &project.name,
                FleetEvent::StaleMachineRemoved {
                    service: service.name.clone(),
                    machine_id: machine.id.clone(),
                },
            );
        }

        let resolved = self.resolver.resolve(service).await?;
        self.emit(
            &project.name,
            FleetEvent::ArtifactResolved {
                service: service.name.clone(),
                artifact: resolved.artifact.clone(),
                source: resolved.source.to_string(),
            },
        );

        let target = service.target()?;
        let request = LaunchRequest {
            name: service.name.clone(),
            artifact: resolved.artifact.clone(),
            platform: target.platform,
            architecture: target.architecture,
            networks: project.attachments(service),
            detach: true,
        };
        info!(
            service = %service.name,
            artifact = %request.artifact,
            networks = ?request.network_args(),
            "Launching"
        );
        self.machines
            .launch(request)
            .await
            .map_err(|e| ComposeError::driver(format!("machine {}", service.name), e))?;

        let machine = self
            .machines
            .get(&service.name)
            .await
            .map_err(|e| ComposeError::driver(format!("machine {}", service.name), e))?
            .ok_or_else(|| {
                ComposeError::driver(
                    format!("machine {}", service.name),
                    unifleet_drivers::DriverError::not_found(
                        unifleet_drivers::ResourceKind::Machine,
                        &service.name,
                    ),
                )
            })?;

        pass.live_machines.insert(machine.id.to_string());
        if machine.state.is_running() {
            pass.owned.add_machine(ResourceRef::from(&machine));
        } else {
            warn!(service = %service.name, state = %machine.state, "Machine not running after launch");
        }
        self.emit(
            &project.name,
            FleetEvent::MachineLaunched {
                service: service.name.clone(),
                machine_id: machine.id.clone(),
            },
        );

        Ok(ServiceOutcome::Launched {
            machine_id: machine.id,
            artifact: resolved.artifact,
            state: machine.state,
        })
    }

    /// Merge this pass into the stored record, releasing owned ids that no
    /// longer exist.
    async fn persist(
        &self,
        project: &Project,
        pass: PassState,
    ) -> Result<(CompositeState, Vec<String>)> {
        let store_err = |source| ComposeError::Store {
            project: project.name.clone(),
            source,
        };

        let stored = self.store.get(&project.name).await.map_err(store_err)?;
        let mut released = BTreeSet::new();
        if let Some(stored) = &stored {
            released.extend(
                stored
                    .networks
                    .iter()
                    .filter(|n| !pass.live_networks.contains(&n.id))
                    .map(|n| n.id.clone()),
            );
            released.extend(
                stored
                    .machines
                    .iter()
                    .filter(|m| !pass.live_machines.contains(&m.id))
                    .map(|m| m.id.clone()),
            );
        }
        if !released.is_empty() {
            info!(released = released.len(), "Releasing resources that no longer exist");
        }

        let update = CompositeUpdate {
            state: pass.owned,
            released: released.clone(),
        };
        let state = self.store.update(update).await.map_err(store_err)?;
        Ok((state, released.into_iter().collect()))
    }

    async fn follow_logs(&self, project: &Project, cancel: &CancellationToken) {
        let width = project.longest_service_name();
        let mut tails = JoinSet::new();

        for service in &project.services {
            let machines = self.machines.clone();
            let sink = self.sink.clone();
            let name = service.name.clone();
            let prefix = log_prefix(&service.name, width);
            let cancel = cancel.child_token();

            tails.spawn(async move {
                let mut lines = match machines.logs(&name, true, cancel.clone()).await {
                    Ok(lines) => lines,
                    Err(e) => {
                        error!(service = %name, error = %e, "Could not follow logs");
                        return;
                    }
                };
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        line = lines.recv() => match line {
                            Some(line) => sink.line(&prefix, &line),
                            None => break,
                        },
                    }
                }
            });
        }

        while let Some(joined) = tails.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Log follower panicked");
            }
        }
    }

    fn emit(&self, project: &str, event: FleetEvent) {
        let envelope = FleetEventEnvelope::new(event, EventSource::Compose).with_project(project);
        let _ = self.event_tx.send(envelope);
    }
}
