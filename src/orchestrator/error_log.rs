use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub source_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Most recent errors across all sources; the oldest entry is evicted once
/// capacity is reached.
#[derive(Debug)]
pub struct ErrorLog {
    entries: Mutex<VecDeque<ErrorRecord>>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push<S: Into<String>>(&self, source_id: S, message: S) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ErrorRecord {
            source_id: source_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Entries oldest first
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn last_for(&self, source_id: &str) -> Option<ErrorRecord> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.source_id == source_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
