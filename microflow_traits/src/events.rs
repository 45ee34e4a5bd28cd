//! Event sink for human-readable device notices (state transitions,
//! validation failures, parameter changes).
//!
//! Components receive a `SharedLog` at construction; there is no global
//! instance. The format of what a sink does with an event is up to the sink.
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

pub trait EventLog: Send + Sync {
    fn record(&self, level: EventLevel, source: &str, message: &str);
}

pub type SharedLog = Arc<dyn EventLog>;

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl EventLog for NullLog {
    fn record(&self, _level: EventLevel, _source: &str, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub level: EventLevel,
    pub source: String,
    pub message: String,
}

/// In-memory sink that keeps events in arrival order.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LoggedEvent>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn entries(&self) -> Vec<LoggedEvent> {
        self.entries.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Index of the first event from `source` whose message contains `needle`.
    pub fn position(&self, source: &str, needle: &str) -> Option<usize> {
        self.entries()
            .iter()
            .position(|e| e.source == source && e.message.contains(needle))
    }

    pub fn count_at(&self, level: EventLevel) -> usize {
        self.entries().iter().filter(|e| e.level == level).count()
    }
}

impl EventLog for MemoryLog {
    fn record(&self, level: EventLevel, source: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LoggedEvent {
                level,
                source: source.to_string(),
                message: message.to_string(),
            });
        }
    }
}
