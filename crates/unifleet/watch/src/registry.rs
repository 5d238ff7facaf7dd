//! Watch registry
//!
//! Concurrent map of the machines currently under observation. The control
//! loop adds, observers remove; every operation goes through the map's own
//! sharded locking, so interleaved calls never lose or duplicate an entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use unifleet_types::{Machine, MachineId, MachineState};

/// A machine as seen by the watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMachine {
    pub id: MachineId,
    pub name: String,

    /// Last state reported by the driver
    pub state: MachineState,

    pub observed_since: chrono::DateTime<chrono::Utc>,
}

/// Machines under observation, keyed by id
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: DashMap<MachineId, ObservedMachine>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a machine. Returns false if it was already present.
    pub fn add(&self, machine: &Machine) -> bool {
        match self.entries.entry(machine.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(ObservedMachine {
                    id: machine.id.clone(),
                    name: machine.name.clone(),
                    state: machine.state,
                    observed_since: chrono::Utc::now(),
                });
                true
            }
        }
    }

    /// Remove a machine. Removing an absent id is a no-op.
    pub fn remove(&self, id: &MachineId) -> Option<ObservedMachine> {
        self.entries.remove(id).map(|(_, observed)| observed)
    }

    /// Record a reported state. Returns false if the id is not registered.
    pub fn update_state(&self, id: &MachineId, state: MachineState) -> bool {
        match self.entries.get_mut(id) {
            Some(mut observed) => {
                observed.state = state;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &MachineId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &MachineId) -> Option<ObservedMachine> {
        self.entries.get(id).map(|e| e.clone())
    }

    /// Current members, sorted by id
    pub fn snapshot(&self) -> Vec<ObservedMachine> {
        let mut members: Vec<ObservedMachine> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        members.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        members
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn machine(id: &str) -> Machine {
        Machine {
            id: MachineId::new(id),
            name: format!("name-{id}"),
            platform: "qemu".to_string(),
            architecture: "x86_64".to_string(),
            artifact: "org/app:latest".to_string(),
            state: MachineState::Starting,
            networks: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = WatchRegistry::new();
        assert!(registry.add(&machine("a")));
        assert!(!registry.add(&machine("a")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = WatchRegistry::new();
        assert!(registry.remove(&MachineId::new("ghost")).is_none());
        registry.add(&machine("a"));
        assert!(registry.remove(&MachineId::new("a")).is_some());
        assert!(registry.remove(&MachineId::new("a")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_state_reflects_only() {
        let registry = WatchRegistry::new();
        let id = MachineId::new("a");
        assert!(!registry.update_state(&id, MachineState::Running));

        registry.add(&machine("a"));
        assert!(registry.update_state(&id, MachineState::Running));
        assert_eq!(registry.get(&id).unwrap().state, MachineState::Running);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = WatchRegistry::new();
        for id in ["c", "a", "b"] {
            registry.add(&machine(id));
        }
        let ids: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    proptest! {
        /// Operations on one id stay on one thread; different ids race freely.
        #[test]
        fn snapshot_matches_added_but_not_removed(
            ops in prop::collection::vec((any::<bool>(), 0u8..32), 0..200)
        ) {
            const THREADS: u8 = 4;

            let mut expected = BTreeSet::new();
            for (add, id) in &ops {
                if *add {
                    expected.insert(id.to_string());
                } else {
                    expected.remove(&id.to_string());
                }
            }

            let registry = WatchRegistry::new();
            std::thread::scope(|scope| {
                for lane in 0..THREADS {
                    let registry = &registry;
                    let ops = &ops;
                    scope.spawn(move || {
                        for (add, id) in ops.iter().filter(|(_, id)| id % THREADS == lane) {
                            let id = id.to_string();
                            if *add {
                                registry.add(&machine(&id));
                            } else {
                                registry.remove(&MachineId::new(id));
                            }
                        }
                    });
                }
            });

            let snapshot: Vec<String> = registry
                .snapshot()
                .into_iter()
                .map(|m| m.id.to_string())
                .collect();
            let unique: BTreeSet<String> = snapshot.iter().cloned().collect();
            prop_assert_eq!(snapshot.len(), unique.len());
            prop_assert_eq!(unique, expected);
        }
    }
}
