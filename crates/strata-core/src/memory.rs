use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Role;

/// Kind of long-term memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Events, interactions, and business-data summaries.
    Episodic,
    /// Stable facts, preferences, and profile knowledge.
    #[default]
    Semantic,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = crate::StrataError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            other => Err(crate::StrataError::InvalidRequest(format!(
                "unknown memory type '{other}' (expected 'episodic' or 'semantic')"
            ))),
        }
    }
}

/// One turn of a conversation held in the short-term buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub text: String,
}

/// An in-progress reasoning artifact (plan, tool observation, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    /// The value, already serialized to display text.
    pub value: String,
}

/// A vectorized long-term record. Identity is `(user_id, memory_type, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub user_id: String,
    pub memory_type: MemoryType,
    pub key: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl LongTermRecord {
    /// Index id of this record: `{user_id}:{type}:{key}`.
    pub fn record_id(&self) -> String {
        Self::id_for(&self.user_id, self.memory_type, &self.key)
    }

    pub fn id_for(user_id: &str, memory_type: MemoryType, key: &str) -> String {
        format!("{user_id}:{memory_type}:{key}")
    }

    /// Id used before records were namespaced by memory type.
    pub fn legacy_id_for(user_id: &str, key: &str) -> String {
        format!("{user_id}:{key}")
    }

    /// Metadata stored alongside the vector.
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut meta = serde_json::Map::new();
        meta.insert("user_id".into(), self.user_id.clone().into());
        meta.insert("key".into(), self.key.clone().into());
        meta.insert("type".into(), self.memory_type.as_str().into());
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids() {
        let record = LongTermRecord {
            user_id: "u1".into(),
            memory_type: MemoryType::Episodic,
            key: "business_patent".into(),
            content: "P1 summary".into(),
            embedding: vec![],
        };
        assert_eq!(record.record_id(), "u1:episodic:business_patent");
        assert_eq!(LongTermRecord::legacy_id_for("u1", "pref"), "u1:pref");
        assert_eq!(record.metadata()["type"], "episodic");
    }

    #[test]
    fn memory_type_parses_case_insensitively() {
        assert_eq!("Semantic".parse::<MemoryType>().unwrap(), MemoryType::Semantic);
        assert!("procedural".parse::<MemoryType>().is_err());
    }
}
