use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use strata_core::{ConversationTurn, Role};

/// Short-term memory: the most recent turns of every session, oldest first.
///
/// One lock guards all sessions; each operation holds it only for the copy.
pub struct ConversationBuffer {
    sessions: Mutex<HashMap<String, VecDeque<ConversationTurn>>>,
    capacity: usize,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ConversationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a turn stamped with the current time, evicting the oldest beyond capacity.
    pub fn add(&self, session_id: &str, role: Role, text: impl Into<String>) {
        let turn = ConversationTurn {
            timestamp: Utc::now(),
            role,
            text: text.into(),
        };
        let mut sessions = self.sessions.lock();
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push_back(turn);
        while turns.len() > self.capacity {
            turns.pop_front();
        }
    }

    /// Snapshot of every retained turn.
    pub fn get(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The last `limit` turns, oldest first.
    pub fn recent(&self, session_id: &str, limit: usize) -> Vec<ConversationTurn> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|turns| {
                let skip = turns.len().saturating_sub(limit);
                turns.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
