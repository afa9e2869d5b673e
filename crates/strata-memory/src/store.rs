use std::path::Path;
use std::sync::Arc;
use tracing::info;

use strata_core::{MemoryType, Result, Role};
use strata_llm::EmbeddingProvider;

use crate::buffer::ConversationBuffer;
use crate::context::{AgentContext, ContextAssembler};
use crate::index::{SqliteVectorIndex, VectorIndex};
use crate::long_term::{LongTermStore, Recall};
use crate::scratchpad::TaskScratchpad;

/// Unified memory store combining the short-term, working, and long-term layers.
///
/// Cheap to clone; clones share the same layers.
#[derive(Clone)]
pub struct MemoryStore {
    pub buffer: Arc<ConversationBuffer>,
    pub scratchpad: Arc<TaskScratchpad>,
    pub long_term: Arc<LongTermStore>,
    assembler: Arc<ContextAssembler>,
}

impl MemoryStore {
    pub fn new(
        buffer: ConversationBuffer,
        scratchpad: TaskScratchpad,
        long_term: LongTermStore,
    ) -> Self {
        let buffer = Arc::new(buffer);
        let scratchpad = Arc::new(scratchpad);
        let long_term = Arc::new(long_term);
        let assembler = Arc::new(ContextAssembler::new(
            Arc::clone(&buffer),
            Arc::clone(&scratchpad),
            Arc::clone(&long_term),
        ));
        Self {
            buffer,
            scratchpad,
            long_term,
            assembler,
        }
    }

    /// Open the long-term index at `path` with default buffer sizes.
    pub fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        info!(?path, embedder = embedder.name(), "opening memory store");
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open(path)?);
        Ok(Self::new(
            ConversationBuffer::default(),
            TaskScratchpad::default(),
            LongTermStore::new(embedder, index),
        ))
    }

    /// Fully in-memory store (tests, ephemeral sessions).
    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open_in_memory()?);
        Ok(Self::new(
            ConversationBuffer::default(),
            TaskScratchpad::default(),
            LongTermStore::new(embedder, index),
        ))
    }

    pub fn add_turn(&self, session_id: &str, role: Role, text: impl Into<String>) {
        self.buffer.add(session_id, role, text);
    }

    pub async fn get_context(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        short_term_limit: usize,
        long_term_top_k: usize,
    ) -> AgentContext {
        self.assembler
            .get_context(user_id, session_id, query, short_term_limit, long_term_top_k)
            .await
    }

    /// Forget the session's conversation and scratchpad.
    pub fn clear_short_term(&self, session_id: &str) {
        self.buffer.clear(session_id);
        self.scratchpad.clear(session_id);
    }

    pub async fn upsert_long_term(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
        memory_type: MemoryType,
    ) -> Result<()> {
        self.long_term.upsert(user_id, key, value, memory_type).await
    }

    pub async fn get_long_term(
        &self,
        user_id: &str,
        key: &str,
        memory_type: Option<MemoryType>,
    ) -> Option<String> {
        self.long_term.get_exact(user_id, key, memory_type).await
    }

    pub async fn search_long_term(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
        memory_type: Option<MemoryType>,
    ) -> Recall {
        self.long_term
            .query_semantic(user_id, query, top_k, memory_type)
            .await
    }

    /// Delete every long-term record of the user.
    pub async fn clear_long_term(&self, user_id: &str) -> Result<usize> {
        let removed = self.long_term.delete_all(user_id).await?;
        info!(user_id, removed, "long-term memory cleared");
        Ok(removed)
    }

    pub async fn add_business_data(&self, user_id: &str, data_type: &str, data: &str) -> Result<()> {
        self.long_term.add_business_data(user_id, data_type, data).await
    }
}
