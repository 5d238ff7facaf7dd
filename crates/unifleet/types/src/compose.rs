//! Persisted composite state
//!
//! One `CompositeState` per project records which networks and machines the
//! project owns. Records are only ever merged: a pass adds what it created,
//! and the only way an entry leaves is by being released explicitly because
//! its resource no longer exists.

use crate::machine::Machine;
use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Identity of an owned resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl From<&Machine> for ResourceRef {
    fn from(machine: &Machine) -> Self {
        Self::new(machine.id.as_str(), machine.name.clone())
    }
}

impl From<&Network> for ResourceRef {
    fn from(network: &Network) -> Self {
        Self::new(network.id.as_str(), network.name.clone())
    }
}

/// What a project owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeState {
    /// Project name
    pub project: String,

    pub composefile: Option<PathBuf>,

    pub workdir: PathBuf,

    pub networks: Vec<ResourceRef>,

    pub machines: Vec<ResourceRef>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CompositeState {
    pub fn new(project: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            composefile: None,
            workdir: workdir.into(),
            networks: Vec::new(),
            machines: Vec::new(),
            updated_at: chrono::Utc::now(),
        }
    }

    pub fn with_composefile(mut self, composefile: impl Into<PathBuf>) -> Self {
        self.composefile = Some(composefile.into());
        self
    }

    pub fn owns_network(&self, id: &str) -> bool {
        self.networks.iter().any(|n| n.id == id)
    }

    pub fn owns_machine(&self, id: &str) -> bool {
        self.machines.iter().any(|m| m.id == id)
    }

    pub fn add_network(&mut self, network: ResourceRef) {
        upsert(&mut self.networks, network);
    }

    pub fn add_machine(&mut self, machine: ResourceRef) {
        upsert(&mut self.machines, machine);
    }

    /// Fold `newer` into this record.
    ///
    /// `composefile` and `workdir` come from `newer`; owned sets become the
    /// union, with entries of `newer` replacing same-id entries in place.
    pub fn merge(&mut self, newer: &CompositeState) {
        if newer.composefile.is_some() {
            self.composefile = newer.composefile.clone();
        }
        self.workdir = newer.workdir.clone();
        for network in &newer.networks {
            upsert(&mut self.networks, network.clone());
        }
        for machine in &newer.machines {
            upsert(&mut self.machines, machine.clone());
        }
        self.updated_at = self.updated_at.max(newer.updated_at);
    }

    /// Drop owned entries whose id is in `released`.
    pub fn release(&mut self, released: &BTreeSet<String>) {
        self.networks.retain(|n| !released.contains(&n.id));
        self.machines.retain(|m| !released.contains(&m.id));
    }
}

fn upsert(entries: &mut Vec<ResourceRef>, entry: ResourceRef) {
    match entries.iter_mut().find(|e| e.id == entry.id) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

/// A merge-update of one project's record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeUpdate {
    /// Resources this pass found or created
    pub state: CompositeState,

    /// Ids of previously owned resources that no longer exist
    pub released: BTreeSet<String>,
}

impl CompositeUpdate {
    pub fn new(state: CompositeState) -> Self {
        Self {
            state,
            released: BTreeSet::new(),
        }
    }

    /// Apply this update on top of `stored` (if any) and return the result.
    pub fn apply(&self, stored: Option<CompositeState>) -> CompositeState {
        let mut merged = match stored {
            Some(mut stored) => {
                stored.merge(&self.state);
                stored
            }
            None => self.state.clone(),
        };
        merged.release(&self.released);
        merged
    }
}
