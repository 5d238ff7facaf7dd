//! Command implementations

pub mod events;
pub mod up;
