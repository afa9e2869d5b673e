use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use strata_core::{LongTermRecord, MemoryType, Result};
use strata_llm::EmbeddingProvider;

use crate::index::{IndexRecord, MetadataFilter, VectorIndex};

/// Outcome of a long-term read. A failed read is not the same as an empty one.
#[derive(Debug, Clone, PartialEq)]
pub enum Recall {
    Found(Vec<String>),
    Empty,
    /// The read failed (embedding or index error); the reason is kept for logs.
    Unavailable(String),
}

impl Recall {
    fn from_documents(documents: Vec<String>) -> Self {
        if documents.is_empty() {
            Recall::Empty
        } else {
            Recall::Found(documents)
        }
    }

    /// Hits, with both non-found outcomes degraded to an empty list.
    pub fn into_hits(self) -> Vec<String> {
        match self {
            Recall::Found(hits) => hits,
            Recall::Empty | Recall::Unavailable(_) => Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Recall::Found(_))
    }
}

/// Per-user episodic and semantic memory kept in a vector index.
///
/// Records are keyed by `(user_id, memory_type, key)`; writing the same
/// identity twice leaves one record holding the latest content.
pub struct LongTermStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    write_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

fn user_filter(user_id: &str, memory_type: Option<MemoryType>) -> MetadataFilter {
    let filter = MetadataFilter::new().eq("user_id", user_id);
    match memory_type {
        Some(t) => filter.eq("type", t.as_str()),
        None => filter,
    }
}

impl LongTermStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            write_locks: DashMap::new(),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Embed `value` and store it under `(user_id, memory_type, key)`, replacing
    /// any previous record of that identity.
    pub async fn upsert(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
        memory_type: MemoryType,
    ) -> Result<()> {
        let embedding = self.embedder.embed_one(value).await?;
        let record = LongTermRecord {
            user_id: user_id.to_string(),
            memory_type,
            key: key.to_string(),
            content: value.to_string(),
            embedding,
        };
        let id = record.record_id();

        let lock = Arc::clone(&self.write_locks.entry(id.clone()).or_default());
        let guard = lock.lock().await;

        if let Err(e) = self.index.delete(std::slice::from_ref(&id)).await {
            warn!(id = %id, error = %e, "delete before upsert failed, inserting anyway");
        }
        let metadata = record.metadata();
        let result = self
            .index
            .upsert(IndexRecord {
                id: id.clone(),
                embedding: record.embedding,
                document: record.content,
                metadata,
            })
            .await;

        drop(guard);
        drop(lock);
        self.write_locks
            .remove_if(&id, |_, l| Arc::strong_count(l) == 1);

        result?;
        debug!(id = %id, "long-term record written");
        Ok(())
    }

    /// Exact lookup by key. Probes the typed id first, then the other type,
    /// then the legacy untyped id. Probe failures are logged and skipped.
    pub async fn get_exact(
        &self,
        user_id: &str,
        key: &str,
        memory_type: Option<MemoryType>,
    ) -> Option<String> {
        let mut candidates = vec![
            LongTermRecord::id_for(user_id, memory_type.unwrap_or_default(), key),
            LongTermRecord::id_for(user_id, MemoryType::Semantic, key),
            LongTermRecord::id_for(user_id, MemoryType::Episodic, key),
            LongTermRecord::legacy_id_for(user_id, key),
        ];
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|id| seen.insert(id.clone()));

        for id in candidates {
            match self.index.get(std::slice::from_ref(&id)).await {
                Ok(hits) => {
                    if let Some(hit) = hits.into_iter().next() {
                        return Some(hit.document);
                    }
                }
                Err(e) => warn!(id = %id, error = %e, "long-term probe failed"),
            }
        }
        None
    }

    /// Similarity search over one user's records, most similar first.
    pub async fn query_semantic(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
        memory_type: Option<MemoryType>,
    ) -> Recall {
        let embedding = match self.embedder.embed_one(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!(user_id, error = %e, "query embedding failed, long-term recall unavailable");
                return Recall::Unavailable(e.to_string());
            }
        };
        match self
            .index
            .query(&embedding, &user_filter(user_id, memory_type), top_k)
            .await
        {
            Ok(hits) => Recall::from_documents(hits.into_iter().map(|h| h.document).collect()),
            Err(e) => {
                warn!(user_id, error = %e, "long-term query failed");
                Recall::Unavailable(e.to_string())
            }
        }
    }

    /// Every record of the user, optionally of one type.
    pub async fn list_all(&self, user_id: &str, memory_type: Option<MemoryType>) -> Recall {
        match self.index.get_where(&user_filter(user_id, memory_type)).await {
            Ok(hits) => Recall::from_documents(hits.into_iter().map(|h| h.document).collect()),
            Err(e) => {
                warn!(user_id, error = %e, "long-term listing failed");
                Recall::Unavailable(e.to_string())
            }
        }
    }

    /// Remove every record of the user, returning how many were deleted.
    pub async fn delete_all(&self, user_id: &str) -> Result<usize> {
        self.index.delete_where(&user_filter(user_id, None)).await
    }

    /// Store a business-data summary as episodic memory under `business_{data_type}`.
    pub async fn add_business_data(&self, user_id: &str, data_type: &str, data: &str) -> Result<()> {
        self.upsert(user_id, &format!("business_{data_type}"), data, MemoryType::Episodic)
            .await
    }
}
