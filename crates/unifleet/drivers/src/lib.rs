//! Unifleet Drivers - Contracts for everything the engines do not own
//!
//! The reconciliation and watch engines never talk to a hypervisor, a bridge,
//! a registry or a build toolchain directly. They call through the traits in
//! this crate:
//!
//! - **MachineDriver**: list, launch, stop, remove and watch machines on one platform
//! - **NetworkDriver**: create, list and look up networks
//! - **Catalog**: query local and remote packages, pull and push them
//! - **Builder** / **Packager**: turn a build context into a local package
//! - **ComposeStore**: persist per-project composite state
//!
//! `DriverRegistry` selects a machine driver by platform name and also acts as
//! a fleet-wide machine driver that fans out across every registered platform.
//!
//! ## In-Memory vs Real Backends
//!
//! The in-memory implementations are complete enough to drive the engines in
//! tests and local simulation. Real backends implement the same traits.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod catalog;
pub mod error;
pub mod machine;
pub mod memory;
pub mod network;
pub mod registry;
pub mod store;

// Re-exports
pub use catalog::{Builder, Catalog, Packager};
pub use error::{DriverError, ResourceKind, Result};
pub use machine::{MachineDriver, MachineEvents};
pub use memory::{
    InMemoryBuilder, InMemoryCatalog, InMemoryComposeStore, InMemoryMachineDriver,
    InMemoryNetworkDriver, InMemoryPackager, StreamFault,
};
pub use network::NetworkDriver;
pub use registry::{DriverRegistry, AUTO_PLATFORM};
pub use store::{ComposeStore, JsonFileComposeStore};
