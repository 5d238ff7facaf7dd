//! Watch configuration

use std::time::Duration;
use unifleet_types::Machine;

/// Default interval between machine listings
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Only observe the machine with this id or name
    pub filter: Option<String>,

    /// Interval between machine listings
    pub poll_interval: Duration,

    /// Stop once no matching non-terminal machine is left
    pub quit_together: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            filter: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            quit_together: false,
        }
    }
}

impl WatchConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_quit_together(mut self, quit_together: bool) -> Self {
        self.quit_together = quit_together;
        self
    }

    /// True when `machine` passes the filter.
    pub fn matches(&self, machine: &Machine) -> bool {
        match &self.filter {
            Some(filter) => machine.matches(filter),
            None => true,
        }
    }

    /// True when `machine` should be observed on this tick.
    pub fn wants(&self, machine: &Machine) -> bool {
        self.matches(machine) && !(self.quit_together && machine.state.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unifleet_types::{MachineId, MachineState};

    fn machine(name: &str, state: MachineState) -> Machine {
        Machine {
            id: MachineId::new(format!("id-{name}")),
            name: name.to_string(),
            platform: "qemu".to_string(),
            architecture: "x86_64".to_string(),
            artifact: "org/app:latest".to_string(),
            state,
            networks: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_filter_by_name_or_id() {
        let config = WatchConfig::default().with_filter("web");
        assert!(config.matches(&machine("web", MachineState::Running)));
        assert!(!config.matches(&machine("db", MachineState::Running)));

        let config = WatchConfig::default().with_filter("id-db");
        assert!(config.matches(&machine("db", MachineState::Running)));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let config = WatchConfig::default().with_filter("");
        assert_eq!(config.filter, None);
        assert!(config.matches(&machine("anything", MachineState::Unknown)));
    }

    #[test]
    fn test_terminal_machines_skipped_only_when_quitting_together() {
        let exited = machine("web", MachineState::Exited);
        assert!(WatchConfig::default().wants(&exited));
        assert!(!WatchConfig::default().with_quit_together(true).wants(&exited));
        assert!(WatchConfig::default()
            .with_quit_together(true)
            .wants(&machine("web", MachineState::Starting)));
    }
}
