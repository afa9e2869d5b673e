use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use strata_core::{Result, StrataError};
use strata_llm::EmbeddingProvider;
use strata_memory::{MetadataFilter, VectorIndex};

use crate::document::{RetrievedDocument, Retriever, ranked};

/// Dense retriever over one embedding representation of the knowledge base.
pub struct VectorRetriever {
    name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(
        name: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            name: name.into(),
            embedder,
            index,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let as_retrieval_err = |e: StrataError| StrataError::Retrieval {
            retriever: self.name.clone(),
            reason: e.to_string(),
        };
        let embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(as_retrieval_err)?;
        let hits = self
            .index
            .query(&embedding, &MetadataFilter::new(), k)
            .await
            .map_err(as_retrieval_err)?;
        debug!(retriever = %self.name, hits = hits.len(), "dense retrieval");
        Ok(ranked(&self.name, hits.into_iter().map(|h| h.document)))
    }
}
