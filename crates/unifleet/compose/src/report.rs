//! Reconciliation report

use serde::{Deserialize, Serialize};
use unifleet_types::{CompositeState, MachineId, MachineState};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpReport {
    pub project: String,

    /// Networks created during this pass, in creation order
    pub networks_created: Vec<String>,

    pub networks_failed: Vec<NetworkFailure>,

    /// One entry per declared service, in declaration order
    pub services: Vec<ServiceReport>,

    /// Previously owned ids dropped because the resource no longer exists
    pub released: Vec<String>,

    /// Composite state as persisted
    pub state: CompositeState,
}

impl UpReport {
    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.service == name)
    }

    /// Names of services that could not be brought up
    pub fn failed_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|s| s.outcome.is_failed())
            .map(|s| s.service.clone())
            .collect()
    }

    /// Number of machines launched by this pass
    pub fn launched(&self) -> usize {
        self.services
            .iter()
            .filter(|s| matches!(s.outcome, ServiceOutcome::Launched { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.networks_failed.is_empty() && self.services.iter().all(|s| !s.outcome.is_failed())
    }
}

/// A network that could not be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFailure {
    pub network: String,
    pub error: String,
}

/// Per-service entry of an `UpReport`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub service: String,
    pub outcome: ServiceOutcome,
}

/// What happened to a service during the pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ServiceOutcome {
    /// A machine with the service's name was already running
    AlreadyRunning { machine_id: MachineId },

    /// A machine was launched
    Launched {
        machine_id: MachineId,
        artifact: String,
        state: MachineState,
    },

    Failed { error: String },
}

impl ServiceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ServiceOutcome::Failed { .. })
    }
}
