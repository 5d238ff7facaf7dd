//! Console following for `up`

use tracing::info;

/// Pad `name` with spaces to `width` so multi-service output lines up.
pub fn log_prefix(name: &str, width: usize) -> String {
    format!("{name:<width$}")
}

/// Destination for console lines of followed services
pub trait LogSink: Send + Sync {
    fn line(&self, prefix: &str, line: &str);
}

/// Sink writing console lines as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn line(&self, prefix: &str, line: &str) {
        info!(target: "unifleet::console", "{prefix} | {line}");
    }
}
