//! Protocol traffic log
//!
//! The engine reports every request, response and failure through an
//! optional [`ProtocolLog`]. A display panel implements the trait; without
//! one the engine still emits `tracing` events.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Direction / severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Outbound,
    Inbound,
    Error,
    Other,
}

/// Sink for protocol log entries
pub trait ProtocolLog: Send + Sync {
    fn append(&self, message: &str, category: LogCategory);
}

/// Forwards entries to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl ProtocolLog for TracingLog {
    fn append(&self, message: &str, category: LogCategory) {
        match category {
            LogCategory::Outbound => debug!(target: "obd::traffic", "-> {}", message),
            LogCategory::Inbound => debug!(target: "obd::traffic", "<- {}", message),
            LogCategory::Error => warn!(target: "obd::traffic", "!! {}", message),
            LogCategory::Other => info!(target: "obd::traffic", "{}", message),
        }
    }
}

/// A recorded log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    pub category: LogCategory,
}

/// Keeps entries in memory; clones share the same buffer
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all entries so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of entries in a category
    pub fn count(&self, category: LogCategory) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|e| e.category == category).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl ProtocolLog for MemoryLog {
    fn append(&self, message: &str, category: LogCategory) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                message: message.to_string(),
                category,
            });
        }
    }
}

/// Fan-out used inside the engine: always traces, and forwards to the
/// injected sink when one is attached
#[derive(Default)]
pub struct Journal {
    sink: Option<Box<dyn ProtocolLog>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&mut self, sink: Option<Box<dyn ProtocolLog>>) {
        self.sink = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn record(&self, message: &str, category: LogCategory) {
        TracingLog.append(message, category);
        if let Some(sink) = &self.sink {
            sink.append(message, category);
        }
    }
}
