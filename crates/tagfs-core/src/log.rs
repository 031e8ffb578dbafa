//! Bounded activity log of engine responses, newest first.

use chrono::{DateTime, Local, Utc};
use std::collections::VecDeque;
use std::fmt;

/// Default number of entries retained.
pub const LOG_CAPACITY: usize = 50;

/// Outcome marker attached to each log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Ok,
    Error,
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: LogStatus,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, status: LogStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == LogStatus::Error
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local: DateTime<Local> = self.timestamp.into();
        write!(f, "[{}] {}", local.format("%H:%M:%S"), self.message)
    }
}

/// Most-recent-first ring of log entries.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Prepend an entry, trimming the oldest beyond capacity.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest entry, if any.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_is_newest_first() {
        let mut log = ActivityLog::default();
        log.push(LogEntry::new("first", LogStatus::Ok));
        log.push(LogEntry::new("second", LogStatus::Error));

        let messages: Vec<_> = log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
        assert!(log.latest().unwrap().is_error());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut log = ActivityLog::default();
        for i in 0..120 {
            log.push(LogEntry::new(format!("msg {i}"), LogStatus::Ok));
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log.latest().unwrap().message, "msg 119");
        assert_eq!(log.iter().last().unwrap().message, "msg 70");
    }

    #[test]
    fn test_display_prefixes_time() {
        let entry = LogEntry::new("Directory listed", LogStatus::Ok);
        let text = entry.to_string();
        assert!(text.starts_with('['));
        assert!(text.ends_with("] Directory listed"));
    }
}
