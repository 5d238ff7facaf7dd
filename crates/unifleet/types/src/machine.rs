//! Machine types
//!
//! A `Machine` is one launched unikernel instance as reported by its platform
//! driver. The driver is the source of truth for `state`; the engines only
//! read it.

use crate::ids::MachineId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Lifecycle state of a machine
///
/// `Unknown → Starting → Running → {Exited | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    #[default]
    Unknown,
    Starting,
    Running,
    Exited,
    Failed,
}

impl MachineState {
    /// Exited and failed machines never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MachineState::Exited | MachineState::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, MachineState::Running)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Unknown => write!(f, "unknown"),
            MachineState::Starting => write!(f, "starting"),
            MachineState::Running => write!(f, "running"),
            MachineState::Exited => write!(f, "exited"),
            MachineState::Failed => write!(f, "failed"),
        }
    }
}

/// A machine as reported by a platform driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,

    /// Human name, equal to the service name for compose-launched machines
    pub name: String,

    /// Platform driver that owns the machine
    pub platform: String,

    pub architecture: String,

    /// Artifact the machine was launched from
    pub artifact: String,

    pub state: MachineState,

    pub networks: Vec<NetworkAttachment>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Machine {
    /// True when `filter` names this machine by id or by name.
    pub fn matches(&self, filter: &str) -> bool {
        self.id.as_str() == filter || self.name == filter
    }
}

/// A network attachment passed to a launch, rendered as `<network>:<ipv4>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Network resource name
    pub network: String,

    pub ipv4_address: Option<Ipv4Addr>,
}

impl fmt::Display for NetworkAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ipv4_address {
            Some(address) => write!(f, "{}:{}", self.network, address),
            None => write!(f, "{}", self.network),
        }
    }
}

/// Everything a platform driver needs to launch a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub name: String,

    /// Package reference or build output path
    pub artifact: String,

    pub platform: String,

    pub architecture: String,

    pub networks: Vec<NetworkAttachment>,

    /// Return once the machine is started instead of attaching to it
    pub detach: bool,
}

impl LaunchRequest {
    /// Attachments in `<network>:<ipv4>` form.
    pub fn network_args(&self) -> Vec<String> {
        self.networks.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(MachineState::Exited.is_terminal());
        assert!(MachineState::Failed.is_terminal());
        assert!(!MachineState::Unknown.is_terminal());
        assert!(!MachineState::Starting.is_terminal());
        assert!(!MachineState::Running.is_terminal());
    }

    #[test]
    fn test_state_display_matches_serde() {
        for state in [
            MachineState::Unknown,
            MachineState::Starting,
            MachineState::Running,
            MachineState::Exited,
            MachineState::Failed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
    }

    #[test]
    fn test_attachment_rendering() {
        let addressed = NetworkAttachment {
            network: "net0".into(),
            ipv4_address: Some(Ipv4Addr::new(10, 0, 0, 2)),
        };
        let bare = NetworkAttachment {
            network: "plain".into(),
            ipv4_address: None,
        };
        assert_eq!(addressed.to_string(), "net0:10.0.0.2");
        assert_eq!(bare.to_string(), "plain");
    }
}
