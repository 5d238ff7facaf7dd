//! Event types for fleet observability
//!
//! Reconcile and watch passes publish these alongside their log lines so that
//! callers can follow a pass without scraping logs.

use crate::ids::MachineId;
use crate::machine::MachineState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all fleet events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// Event severity
    pub severity: EventSeverity,

    /// Project the event belongs to, when there is one
    pub project: Option<String>,

    /// The actual event
    pub event: FleetEvent,
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Reconciliation engine
    Compose,
    /// Live-state watch engine
    Watch,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Fleet events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetEvent {
    // ═══════════════════════════════════════════════════════════════════
    // RECONCILE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Network created by this pass
    NetworkCreated { network: String },

    /// Network creation failed
    NetworkFailed { network: String, reason: String },

    /// Service already had a running machine
    ServiceSkipped {
        service: String,
        machine_id: MachineId,
    },

    /// Non-running machine removed before relaunch
    StaleMachineRemoved {
        service: String,
        machine_id: MachineId,
    },

    /// Artifact for a service is ready
    ArtifactResolved {
        service: String,
        artifact: String,
        source: String,
    },

    /// Machine launched for a service
    MachineLaunched {
        service: String,
        machine_id: MachineId,
    },

    /// Service could not be brought up
    ServiceFailed { service: String, reason: String },

    /// Composite state written
    StatePersisted { networks: usize, machines: usize },

    // ═══════════════════════════════════════════════════════════════════
    // WATCH EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Observer attached to a machine event stream
    ObservationStarted { machine_id: MachineId, name: String },

    /// Observed machine reported a new state
    StateChanged {
        machine_id: MachineId,
        name: String,
        state: MachineState,
    },

    /// Machine left the watch registry
    ObservationEnded {
        machine_id: MachineId,
        name: String,
        reason: String,
    },
}

impl FleetEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: FleetEvent, source: EventSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source,
            severity: Self::infer_severity(&event),
            project: None,
            event,
        }
    }

    /// Attach the project name
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    fn infer_severity(event: &FleetEvent) -> EventSeverity {
        match event {
            FleetEvent::NetworkFailed { .. } | FleetEvent::ServiceFailed { .. } => {
                EventSeverity::Error
            }

            FleetEvent::StaleMachineRemoved { .. } => EventSeverity::Warning,

            FleetEvent::StateChanged { state, .. } if *state == MachineState::Failed => {
                EventSeverity::Warning
            }

            FleetEvent::ObservationStarted { .. } | FleetEvent::ObservationEnded { .. } => {
                EventSeverity::Debug
            }

            _ => EventSeverity::Info,
        }
    }
}
