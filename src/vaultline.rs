use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub const LEVEL_INFO: &str = "info";
pub const LEVEL_WARN: &str = "warn";
pub const LEVEL_ERROR: &str = "error";

const DEFAULT_CAPACITY: usize = 1024;

// One log record produced while running checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts_ms: u128,
    pub source: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub kv: serde_json::Value,
}

impl Event {
    // Create a new event with current timestamp and empty kv.
    pub fn now<S, L, M>(source: S, level: L, message: M) -> Self
    where
        S: Into<String>,
        L: Into<String>,
        M: Into<String>,
    {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            ts_ms,
            source: source.into(),
            level: level.into(),
            message: message.into(),
            kv: serde_json::Value::Null,
        }
    }

    pub fn with_kv(mut self, kv: serde_json::Value) -> Self {
        self.kv = kv;
        self
    }
}

/// Logging capability handed to backends and the runner.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Forwards events to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: Event) {
        let source = event.source.as_str();
        let kv = if event.kv.is_null() { String::new() } else { event.kv.to_string() };
        match event.level.as_str() {
            LEVEL_ERROR => tracing::error!(source, kv = %kv, "{}", event.message),
            LEVEL_WARN => tracing::warn!(source, kv = %kv, "{}", event.message),
            "debug" => tracing::debug!(source, kv = %kv, "{}", event.message),
            _ => tracing::info!(source, kv = %kv, "{}", event.message),
        }
    }
}

// Bounded in-memory journal of check events.
pub struct Vaultline {
    mem: Mutex<VecDeque<Event>>,
    capacity: usize,
    echo: bool,
}

impl Default for Vaultline {
    fn default() -> Self { Self::new() }
}

impl Vaultline {
    pub fn new() -> Self { Self::with_capacity(DEFAULT_CAPACITY) }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { mem: Mutex::new(VecDeque::new()), capacity: capacity.max(1), echo: false }
    }

    /// Also forward every event to `TracingSink`.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    // Append an event, dropping the oldest when full.
    pub fn append(&self, event: Event) {
        if self.echo {
            TracingSink.record(event.clone());
        }
        let mut mem = self.mem.lock().unwrap_or_else(|p| p.into_inner());
        if mem.len() == self.capacity {
            mem.pop_front();
        }
        mem.push_back(event);
    }

    // Retrieve the last n events.
    pub fn tail(&self, n: usize) -> Vec<Event> {
        let mem = self.mem.lock().unwrap_or_else(|p| p.into_inner());
        let start = mem.len().saturating_sub(n);
        mem.iter().skip(start).cloned().collect()
    }

    pub fn all(&self) -> Vec<Event> {
        self.tail(usize::MAX)
    }

    pub fn count_level(&self, level: &str) -> usize {
        let mem = self.mem.lock().unwrap_or_else(|p| p.into_inner());
        mem.iter().filter(|e| e.level == level).count()
    }

    pub fn len(&self) -> usize {
        self.mem.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn clear(&self) {
        self.mem.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl EventSink for Vaultline {
    fn record(&self, event: Event) { self.append(event); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let ev = Event::now("test_source", "info", "This is a test");
        assert_eq!(ev.source, "test_source");
        assert_eq!(ev.level, "info");
        assert_eq!(ev.message, "This is a test");
        assert!(ev.ts_ms > 0);
        assert!(ev.kv.is_null());
    }

    #[test]
    fn test_vaultline_tail_and_levels() {
        let vault = Vaultline::new();
        assert!(vault.is_empty());

        vault.record(Event::now("db", LEVEL_WARN, "attempt failed"));
        vault.record(Event::now("db", LEVEL_ERROR, "db down"));
        assert_eq!(vault.len(), 2);
        assert_eq!(vault.count_level(LEVEL_WARN), 1);

        let tail = vault.tail(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message, "db down");
        assert_eq!(vault.tail(5).len(), 2);

        vault.clear();
        assert!(vault.is_empty());
    }

    #[test]
    fn test_vaultline_drops_oldest() {
        let vault = Vaultline::with_capacity(2);
        for i in 0..3 {
            vault.append(Event::now("src", LEVEL_INFO, format!("event {i}")));
        }
        let all = vault.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "event 1");
        assert_eq!(all[1].message, "event 2");
    }

    #[test]
    fn test_event_serializes_as_ndjson_line() {
        let ev = Event::now("cache", LEVEL_WARN, "retrying")
            .with_kv(serde_json::json!({"attempt": 1}));
        let line = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(back, ev);
    }
}
