//! Bounded in-memory combat event log.
//!
//! Feeds the `combat_end` summary and UI scrollback. Nothing here is
//! persisted across sessions.

use std::collections::VecDeque;

/// A ring of human-readable combat log lines.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl EventLog {
    /// Default retained history.
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Appends a line, evicting the oldest entry when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
    }

    /// The most recent `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        self.entries
            .iter()
            .skip(self.entries.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates all retained lines, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_tail_returns_most_recent_oldest_first() {
        let mut log = EventLog::new(10);
        log.push("first");
        log.push("second");
        log.push("third");

        assert_eq!(log.tail(2), vec!["second", "third"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_push_past_capacity_evicts_oldest() {
        let mut log = EventLog::new(2);
        log.push("a");
        log.push("b");
        log.push("c");

        assert_eq!(log.len(), 2);
        assert_eq!(log.tail(10), vec!["b", "c"]);
    }

    #[test]
    fn test_tail_larger_than_log_returns_everything() {
        let mut log = EventLog::default();
        log.push("only");
        assert_eq!(log.tail(50), vec!["only"]);
    }
}
