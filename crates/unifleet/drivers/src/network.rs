//! Network driver trait

use crate::error::Result;
use async_trait::async_trait;
use unifleet_types::{CreateNetworkRequest, Network};

/// Driver for host networks that machines attach to
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    /// Create a network
    async fn create(&self, request: CreateNetworkRequest) -> Result<Network>;

    /// Get a network by name
    async fn get(&self, name: &str) -> Result<Option<Network>>;

    /// List all networks
    async fn list(&self) -> Result<Vec<Network>>;

    /// Remove a network
    async fn remove(&self, name: &str) -> Result<()>;
}
