use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::warn;

use strata_core::ScratchpadEntry;

/// Working memory for the task in progress: plans, tool observations, and
/// other intermediate results, newest last. Entries are append-only.
pub struct TaskScratchpad {
    sessions: Mutex<HashMap<String, VecDeque<ScratchpadEntry>>>,
    capacity: usize,
}

impl Default for TaskScratchpad {
    fn default() -> Self {
        Self::new(10)
    }
}

impl TaskScratchpad {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a serializable value. Strings are stored as-is, anything else as compact JSON.
    pub fn add<T: Serialize + ?Sized>(&self, session_id: &str, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::String(s)) => self.add_text(session_id, key, s),
            Ok(other) => self.add_text(session_id, key, other.to_string()),
            Err(e) => warn!(session_id, key, error = %e, "scratchpad value not serializable, skipped"),
        }
    }

    /// Record a value through its `Display` rendering.
    pub fn add_display(&self, session_id: &str, key: &str, value: impl std::fmt::Display) {
        self.add_text(session_id, key, value.to_string());
    }

    pub fn add_text(&self, session_id: &str, key: &str, text: impl Into<String>) {
        let entry = ScratchpadEntry {
            timestamp: Utc::now(),
            key: key.to_string(),
            value: text.into(),
        };
        let mut sessions = self.sessions.lock();
        let entries = sessions.entry(session_id.to_string()).or_default();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn get(&self, session_id: &str) -> Vec<ScratchpadEntry> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }
}
