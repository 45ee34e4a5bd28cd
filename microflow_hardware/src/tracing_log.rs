use microflow_traits::{EventLevel, EventLog};

/// Event sink that forwards device notices to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn record(&self, level: EventLevel, source: &str, message: &str) {
        match level {
            EventLevel::Debug => tracing::debug!(device = source, "{message}"),
            EventLevel::Info => tracing::info!(device = source, "{message}"),
            EventLevel::Warn => tracing::warn!(device = source, "{message}"),
            EventLevel::Error => tracing::error!(device = source, "{message}"),
        }
    }
}
