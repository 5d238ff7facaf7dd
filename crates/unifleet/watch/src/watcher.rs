//! Watch engine
//!
//! One control loop lists machines every `poll_interval` and spawns one
//! observer per newly registered machine. Each observer gets its own copy of
//! the machine record and a clone of the watch's cancellation token.
//!
//! The loop ends when the caller cancels, when `quit_together` finds the
//! registry empty after a listing or after an observer exits, or when listing
//! fails. In every case the observers are
//! cancelled (or left to finish) and drained before `run` returns.

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::registry::WatchRegistry;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use unifleet_drivers::MachineDriver;
use unifleet_types::{
    EventSource, FleetEvent, FleetEventEnvelope, Machine, MachineId, MachineState,
};

/// Why an observer stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverExit {
    /// Machine reached a terminal state
    Terminal(MachineState),

    /// Stream ended on a non-event message
    StreamEnded,

    /// Stream closed without an error
    StreamClosed,

    StreamFailed(String),

    /// The event stream could not be opened
    Unobservable { id: MachineId, reason: String },

    Cancelled,
}

impl fmt::Display for ObserverExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObserverExit::Terminal(state) => write!(f, "machine {state}"),
            ObserverExit::StreamEnded => write!(f, "event stream ended"),
            ObserverExit::StreamClosed => write!(f, "event stream closed"),
            ObserverExit::StreamFailed(reason) => write!(f, "event stream failed: {reason}"),
            ObserverExit::Unobservable { reason, .. } => {
                write!(f, "event stream unavailable: {reason}")
            }
            ObserverExit::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of a finished watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Observers started
    pub observed: usize,

    /// Observers that left the registry
    pub released: usize,

    /// Machines whose event stream could not be opened
    pub unobservable: Vec<MachineId>,
}

/// Watches machines of one driver
pub struct Watcher {
    machines: Arc<dyn MachineDriver>,
    config: WatchConfig,
    event_tx: broadcast::Sender<FleetEventEnvelope>,
}

impl Watcher {
    pub fn new(machines: Arc<dyn MachineDriver>, config: WatchConfig) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            machines,
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Subscribe to watch events
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Watch with a registry scoped to this call.
    pub async fn watch(&self, cancel: CancellationToken) -> Result<WatchSummary> {
        self.run(Arc::new(WatchRegistry::new()), cancel).await
    }

    /// Watch, recording observed machines in `registry`.
    #[instrument(skip(self, registry, cancel), fields(filter = ?self.config.filter, quit_together = self.config.quit_together))]
    pub async fn run(
        &self,
        registry: Arc<WatchRegistry>,
        cancel: CancellationToken,
    ) -> Result<WatchSummary> {
        let token = cancel.child_token();
        let mut observers = Observers::default();
        let mut summary = WatchSummary::default();

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                Some(joined) = observers.tasks.join_next() => {
                    observers.settle(joined, &registry, &mut summary);
                    if self.config.quit_together && registry.is_empty() {
                        info!("Nothing left to observe");
                        token.cancel();
                        break Ok(());
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            observers.reap(&registry, &mut summary);

            let listed = tokio::select! {
                _ = token.cancelled() => break Ok(()),
                listed = self.machines.list() => listed,
            };
            let machines = match listed {
                Ok(machines) => machines,
                Err(e) => {
                    error!(error = %e, "Could not list machines");
                    break Err(WatchError::Listing(e));
                }
            };

            // Observers that finished during the listing
            observers.reap(&registry, &mut summary);

            for machine in machines.into_iter().filter(|m| self.config.wants(m)) {
                if observers.is_tracking(&machine.id) || !registry.add(&machine) {
                    continue;
                }
                debug!(machine_id = %machine.id, name = %machine.name, "Observing machine");
                summary.observed += 1;
                observers.spawn(machine.id.clone(), observe(
                    self.machines.clone(),
                    registry.clone(),
                    machine,
                    token.clone(),
                    self.event_tx.clone(),
                ));
            }

            observers.reap(&registry, &mut summary);

            if self.config.quit_together && registry.is_empty() {
                info!("Nothing left to observe");
                token.cancel();
                break Ok(());
            }
        };

        if outcome.is_err() {
            token.cancel();
        }

        observers.drain(&registry, &mut summary).await;
        summary.unobservable = observers.unobservable.into_iter().collect();
        summary.unobservable.sort();

        outcome.map(|()| summary)
    }
}

/// Observer tasks of one watch call
///
/// An id stays tracked while its observer runs, and for the rest of the call
/// once its stream could not be opened.
#[derive(Default)]
struct Observers {
    tasks: JoinSet<(MachineId, ObserverExit)>,
    running: HashSet<MachineId>,
    unobservable: HashSet<MachineId>,
}

impl Observers {
    fn is_tracking(&self, id: &MachineId) -> bool {
        self.running.contains(id) || self.unobservable.contains(id)
    }

    fn spawn<F>(&mut self, id: MachineId, observer: F)
    where
        F: Future<Output = ObserverExit> + Send + 'static,
    {
        self.running.insert(id.clone());
        self.tasks.spawn(async move { (id, observer.await) });
    }

    fn reap(&mut self, registry: &WatchRegistry, summary: &mut WatchSummary) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.settle(joined, registry, summary);
        }
    }

    async fn drain(&mut self, registry: &WatchRegistry, summary: &mut WatchSummary) {
        while let Some(joined) = self.tasks.join_next().await {
            self.settle(joined, registry, summary);
        }
    }

    fn settle(
        &mut self,
        joined: std::result::Result<(MachineId, ObserverExit), JoinError>,
        registry: &WatchRegistry,
        summary: &mut WatchSummary,
    ) {
        match joined {
            Ok((id, exit)) => {
                self.running.remove(&id);
                registry.remove(&id);
                if matches!(exit, ObserverExit::Unobservable { .. }) {
                    self.unobservable.insert(id);
                } else {
                    summary.released += 1;
                }
            }
            Err(e) => error!(error = %e, "Observer task failed"),
        }
    }
}

/// Follow one machine until it settles, its stream ends, or `cancel` fires.
///
/// The registry entry is removed on every exit, including a stream that
/// cannot be opened. The control loop keeps such ids out of later ticks.
async fn observe(
    machines: Arc<dyn MachineDriver>,
    registry: Arc<WatchRegistry>,
    machine: Machine,
    cancel: CancellationToken,
    events: broadcast::Sender<FleetEventEnvelope>,
) -> ObserverExit {
    let id = machine.id.clone();
    let name = machine.name.clone();
    let emit = |event: FleetEvent| {
        let _ = events.send(FleetEventEnvelope::new(event, EventSource::Watch));
    };

    let mut stream = match machines.watch(&machine, cancel.clone()).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(machine_id = %id, name = %name, error = %e, "Could not open event stream");
            registry.remove(&id);
            return ObserverExit::Unobservable {
                id,
                reason: e.to_string(),
            };
        }
    };
    emit(FleetEvent::ObservationStarted {
        machine_id: id.clone(),
        name: name.clone(),
    });

    let surface = |update: Machine| {
        registry.update_state(&id, update.state);
        info!(machine_id = %id, name = %name, state = %update.state, "State changed");
        emit(FleetEvent::StateChanged {
            machine_id: id.clone(),
            name: name.clone(),
            state: update.state,
        });
        update.state.is_terminal().then_some(ObserverExit::Terminal(update.state))
    };

    let mut errors_open = true;
    let exit = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break ObserverExit::Cancelled,

            err = stream.errors.recv(), if errors_open => match err {
                Some(e) => {
                    // Events delivered ahead of the error are still reported.
                    let mut terminal = None;
                    while let Ok(update) = stream.events.try_recv() {
                        terminal = surface(update);
                        if terminal.is_some() {
                            break;
                        }
                    }
                    if let Some(exit) = terminal {
                        break exit;
                    }
                    if e.is_benign() {
                        info!(machine_id = %id, name = %name, "{e}");
                        break ObserverExit::StreamEnded;
                    }
                    error!(machine_id = %id, name = %name, error = %e, "Event stream failed");
                    break ObserverExit::StreamFailed(e.to_string());
                }
                None => errors_open = false,
            },

            update = stream.events.recv() => match update {
                Some(update) => {
                    if let Some(exit) = surface(update) {
                        break exit;
                    }
                }
                None => break ObserverExit::StreamClosed,
            },
        }
    };

    registry.remove(&id);
    debug!(machine_id = %id, name = %name, reason = %exit, "Observation ended");
    emit(FleetEvent::ObservationEnded {
        machine_id: id,
        name,
        reason: exit.to_string(),
    });
    exit
}
