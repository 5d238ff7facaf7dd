//! Unifleet Types - Core types for compose-style unikernel fleets
//!
//! Unifleet turns a declarative compose project into a running, networked set
//! of unikernel machines and then keeps watching those machines until they
//! stop.
//!
//! ## Key Concepts
//!
//! - **Project**: Named services plus the networks they attach to
//! - **Service**: One workload with an image or build context and a target
//! - **Machine**: A launched instance of a service, owned by a platform driver
//! - **Network**: A bridge created for the project
//! - **CompositeState**: The persisted record of what a project owns
//! - **Events**: Unified observability stream for reconcile and watch passes

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod catalog;
pub mod compose;
pub mod error;
pub mod events;
pub mod ids;
pub mod image;
pub mod ipam;
pub mod machine;
pub mod network;
pub mod project;
pub mod target;

// Re-export main types
pub use catalog::{BuildArtifact, PackageFormat, PackageInfo, PackageOptions, PackageQuery};
pub use compose::{CompositeState, CompositeUpdate, ResourceRef};
pub use error::{Result, TypesError};
pub use events::{EventSeverity, EventSource, FleetEvent, FleetEventEnvelope};
pub use ids::{MachineId, NetworkId};
pub use image::ImageRef;
pub use ipam::Subnet;
pub use machine::{LaunchRequest, Machine, MachineState, NetworkAttachment};
pub use network::{CreateNetworkRequest, Network, NetworkState, DEFAULT_NETWORK_DRIVER};
pub use project::{BuildConfig, NetworkSpec, Project, Service, ServiceNetwork};
pub use target::Target;
