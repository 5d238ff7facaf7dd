//! Reconciliation configuration

use serde::{Deserialize, Serialize};
use unifleet_types::DEFAULT_NETWORK_DRIVER;

/// Reconciler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Follow service consoles after the state is persisted
    #[serde(default = "default_follow_logs")]
    pub follow_logs: bool,

    /// Fail the pass when any service fails
    #[serde(default)]
    pub strict: bool,

    /// Driver for networks that do not name one
    #[serde(default = "default_network_driver")]
    pub default_network_driver: String,
}

fn default_follow_logs() -> bool {
    true
}

fn default_network_driver() -> String {
    DEFAULT_NETWORK_DRIVER.to_string()
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            follow_logs: default_follow_logs(),
            strict: false,
            default_network_driver: default_network_driver(),
        }
    }
}

impl ReconcileConfig {
    /// Configuration for `up --detach`
    pub fn detached() -> Self {
        Self {
            follow_logs: false,
            ..Self::default()
        }
    }
}
