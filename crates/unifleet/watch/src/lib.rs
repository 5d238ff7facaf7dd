//! Unifleet Watch - Follow machines until they settle
//!
//! A `Watcher` polls the platform driver on an interval and attaches one
//! observer task to every matching machine. Observers reflect state changes
//! into a `WatchRegistry` and leave it when their machine reaches a terminal
//! state, their stream ends, or the watch is cancelled.
//!
//! With `quit_together`, the watch ends as soon as nothing is left to observe.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod registry;
pub mod watcher;

// Re-exports
pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use registry::{ObservedMachine, WatchRegistry};
pub use watcher::{ObserverExit, WatchSummary, Watcher};
