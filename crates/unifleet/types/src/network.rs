//! Network types

use crate::ids::NetworkId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Driver used when a network does not declare one
pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";

/// Operational state of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    #[default]
    Unknown,
    Up,
    Down,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::Unknown => write!(f, "unknown"),
            NetworkState::Up => write!(f, "up"),
            NetworkState::Down => write!(f, "down"),
        }
    }
}

/// A network as reported by the network driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    pub driver: String,
    pub subnet: Option<String>,
    pub state: NetworkState,
}

/// Parameters for creating a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNetworkRequest {
    pub name: String,
    pub driver: String,

    /// Subnet in CIDR notation; `None` lets the driver allocate one
    pub subnet: Option<String>,
}
