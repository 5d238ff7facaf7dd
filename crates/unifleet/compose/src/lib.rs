//! Unifleet Compose - Bring a declared project up
//!
//! Given a validated `Project`, the `Reconciler` converges the host toward it:
//!
//! 1. Validate and assign service addresses
//! 2. Create missing networks, subnet-bearing ones first
//! 3. Skip running services, clear stale machines, resolve artifacts, launch
//! 4. Merge the owned resources into the project's composite state, once
//! 5. Follow the console of every declared service until all streams end
//!
//! Per-service failures are isolated and reported in the `UpReport`;
//! validation, listing and persistence failures abort the pass.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod logs;
pub mod reconciler;
pub mod report;
pub mod resolver;

// Re-exports
pub use config::ReconcileConfig;
pub use error::{ComposeError, Result};
pub use logs::{log_prefix, LogSink, TracingLogSink};
pub use reconciler::Reconciler;
pub use report::{NetworkFailure, ServiceOutcome, ServiceReport, UpReport};
pub use resolver::{ArtifactResolver, ArtifactSource, ResolvedArtifact};
