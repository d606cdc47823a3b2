//! In-app console log service.
//!
//! Components never log through a global; they receive an `Arc<dyn LogSink>`.
//! [`ConsoleService`] is the buffering implementation behind the console panel:
//! it keeps leveled entries with read/unread state, notifies listeners on every
//! change, and mirrors each entry to the `log` facade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    Add,
    Update,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounts {
    pub info: usize,
    pub warn: usize,
    pub error: usize,
}

impl UnreadCounts {
    pub fn total(&self) -> usize {
        self.info + self.warn + self.error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: LogEventType,
    pub log: LogEntry,
    pub counts: UnreadCounts,
}

/// Logger handed to every component that reports state transitions.
pub trait LogSink: Send + Sync {
    fn add(&self, level: LogLevel, message: &str) -> LogEntry;

    fn info(&self, message: &str) -> LogEntry {
        self.add(LogLevel::Info, message)
    }

    fn warn(&self, message: &str) -> LogEntry {
        self.add(LogLevel::Warn, message)
    }

    fn error(&self, message: &str) -> LogEntry {
        self.add(LogLevel::Error, message)
    }
}

/// Sink that only forwards to the `log` facade. Entries are not retained.
#[derive(Debug, Default)]
pub struct FacadeLogger;

impl LogSink for FacadeLogger {
    fn add(&self, level: LogLevel, message: &str) -> LogEntry {
        log::log!(target: "facecam", log::Level::from(level), "{}", message);
        LogEntry {
            id: 0,
            level,
            message: message.to_string(),
            timestamp: Utc::now(),
            read: false,
        }
    }
}

pub type LogListener = Arc<dyn Fn(&LogEvent) + Send + Sync>;

/// Handle returned by [`ConsoleService::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ConsoleState {
    logs: VecDeque<LogEntry>,
    next_id: u64,
}

pub struct ConsoleService {
    state: Mutex<ConsoleState>,
    listeners: Mutex<Vec<(ListenerId, LogListener)>>,
    next_listener: Mutex<u64>,
    max_entries: Option<usize>,
}

impl ConsoleService {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Keep at most `max_entries` entries, dropping the oldest first.
    pub fn with_capacity(max_entries: Option<usize>) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                logs: VecDeque::new(),
                next_id: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: Mutex::new(0),
            max_entries: max_entries.map(|n| n.max(1)),
        }
    }

    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_listener.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            ListenerId(*next)
        };
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Add an entry built from several values: strings verbatim, everything
    /// else as JSON, joined by spaces.
    pub fn add_values(&self, level: LogLevel, values: &[serde_json::Value]) -> LogEntry {
        let message = values
            .iter()
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        self.add(level, &message)
    }

    pub fn mark_read(&self, id: u64) {
        self.update_read_state(id, true);
    }

    pub fn mark_unread(&self, id: u64) {
        self.update_read_state(id, false);
    }

    pub fn mark_all_read(&self) {
        let ids: Vec<u64> = self
            .lock_state()
            .logs
            .iter()
            .filter(|log| !log.read)
            .map(|log| log.id)
            .collect();
        for id in ids {
            self.update_read_state(id, true);
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock_state().logs.iter().cloned().collect()
    }

    pub fn unread_counts(&self) -> UnreadCounts {
        count_unread(&self.lock_state().logs)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_read_state(&self, id: u64, read: bool) {
        let event = {
            let mut state = self.lock_state();
            let Some(log) = state.logs.iter_mut().find(|log| log.id == id) else {
                return;
            };
            if log.read == read {
                return;
            }
            log.read = read;
            let log = log.clone();
            LogEvent {
                kind: LogEventType::Update,
                log,
                counts: count_unread(&state.logs),
            }
        };
        self.dispatch(&event);
    }

    fn dispatch(&self, event: &LogEvent) {
        // Listeners may log themselves; never call them with a lock held.
        let listeners: Vec<LogListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl Default for ConsoleService {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for ConsoleService {
    fn add(&self, level: LogLevel, message: &str) -> LogEntry {
        log::log!(target: "facecam", log::Level::from(level), "{}", message);

        let event = {
            let mut state = self.lock_state();
            let entry = LogEntry {
                id: state.next_id,
                level,
                message: message.to_string(),
                timestamp: Utc::now(),
                read: false,
            };
            state.next_id += 1;
            state.logs.push_back(entry.clone());
            if let Some(max) = self.max_entries {
                while state.logs.len() > max {
                    state.logs.pop_front();
                }
            }
            LogEvent {
                kind: LogEventType::Add,
                log: entry,
                counts: count_unread(&state.logs),
            }
        };

        self.dispatch(&event);
        event.log
    }
}

fn count_unread<'a>(logs: impl IntoIterator<Item = &'a LogEntry>) -> UnreadCounts {
    let mut counts = UnreadCounts::default();
    for log in logs.into_iter().filter(|log| !log.read) {
        match log.level {
            LogLevel::Info => counts.info += 1,
            LogLevel::Warn => counts.warn += 1,
            LogLevel::Error => counts.error += 1,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_sequential_ids_and_counts() {
        let console = ConsoleService::new();
        let first = console.info("one");
        let second = console.warn("two");
        console.error("three");

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert_eq!(
            console.unread_counts(),
            UnreadCounts {
                info: 1,
                warn: 1,
                error: 1
            }
        );
    }

    #[test]
    fn test_listeners_receive_add_and_update_events() {
        let console = ConsoleService::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        console.on_change(move |event| {
            sink.lock().unwrap().push((event.kind, event.log.id, event.counts.total()));
        });

        let entry = console.info("hello");
        console.mark_read(entry.id);
        // Marking an already-read entry is not a change.
        console.mark_read(entry.id);
        console.mark_unread(entry.id);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (LogEventType::Add, 0, 1),
                (LogEventType::Update, 0, 0),
                (LogEventType::Update, 0, 1),
            ]
        );
    }

    #[test]
    fn test_remove_listener_stops_notifications() {
        let console = ConsoleService::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let id = console.on_change(move |_| *counter.lock().unwrap() += 1);

        console.info("a");
        assert!(console.remove_listener(id));
        assert!(!console.remove_listener(id));
        console.info("b");

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_add_values_stringifies_non_strings_as_json() {
        let console = ConsoleService::new();
        let entry = console.add_values(
            LogLevel::Info,
            &[
                serde_json::json!("Camera settings:"),
                serde_json::json!({ "width": 1280 }),
                serde_json::json!(30),
            ],
        );
        assert_eq!(entry.message, r#"Camera settings: {"width":1280} 30"#);
    }

    #[test]
    fn test_capacity_drops_oldest_entries() {
        let console = ConsoleService::with_capacity(Some(2));
        console.info("a");
        console.info("b");
        console.info("c");

        let messages: Vec<String> = console.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
        assert_eq!(console.entries()[1].id, 2);
    }

    #[test]
    fn test_mark_all_read_clears_counts() {
        let console = ConsoleService::new();
        console.info("a");
        console.error("b");
        console.mark_all_read();
        assert_eq!(console.unread_counts().total(), 0);
    }
}
