use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use strata_core::{Result, StrataError};
use strata_llm::{EmbeddingProvider, LlmProvider, LlmRequest};
use strata_memory::{MetadataFilter, SqliteVectorIndex, VectorIndex};

use crate::bm25::Bm25Retriever;
use crate::document::{FusedDocument, Retriever};
use crate::fusion::reciprocal_rank_fusion;
use crate::rerank::{Reranker, rerank};
use crate::vector::VectorRetriever;

/// Per-call retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Candidates requested from each retriever.
    pub top_k: usize,
    /// Passages kept after fusion.
    pub rerank_top_n: usize,
    /// Route fused candidates through the external reranker.
    pub use_external_rerank: bool,
    /// Directory holding one index file per representation.
    pub index_root: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            rerank_top_n: 5,
            use_external_rerank: false,
            index_root: PathBuf::from("chroma_db_multi"),
        }
    }
}

/// Lexical plus dense retrieval, fusion, optional rerank, and one completion.
pub struct RetrievalPipeline {
    retrievers: Vec<Arc<dyn Retriever>>,
    reranker: Option<Arc<dyn Reranker>>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question based on the reference content below. If the reference \
         content has no relevant information, answer from general knowledge.\n\n\
         Reference content:\n{context}\n\n\
         Question: {question}\n\n\
         Give a concise and accurate answer:"
    )
}

impl RetrievalPipeline {
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            retrievers,
            reranker: None,
            llm,
            model: "qwen-turbo".into(),
            temperature: 0.2,
            max_tokens: 800,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, temperature: f32) -> Self {
        self.model = model.into();
        self.temperature = temperature;
        self
    }

    /// Open one index per representation under `index_root/{tag}.db`.
    ///
    /// The first representation is the primary one: its passages form the
    /// lexical corpus, so the BM25 retriever always runs first.
    pub async fn open(
        config: &RetrievalConfig,
        llm: Arc<dyn LlmProvider>,
        representations: Vec<(String, Arc<dyn EmbeddingProvider>)>,
    ) -> Result<Self> {
        if representations.is_empty() {
            return Err(StrataError::Config(
                "retrieval needs at least one embedding representation".into(),
            ));
        }

        let mut dense: Vec<Arc<dyn Retriever>> = Vec::with_capacity(representations.len());
        let mut corpus: Option<Vec<String>> = None;
        for (tag, embedder) in representations {
            let path = config.index_root.join(format!("{tag}.db"));
            let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open(&path)?);
            if corpus.is_none() {
                let passages: Vec<String> = index
                    .get_where(&MetadataFilter::new())
                    .await?
                    .into_iter()
                    .map(|hit| hit.document)
                    .collect();
                info!(tag = %tag, passages = passages.len(), "lexical corpus loaded");
                corpus = Some(passages);
            }
            dense.push(Arc::new(VectorRetriever::new(tag, embedder, index)));
        }

        let mut retrievers: Vec<Arc<dyn Retriever>> =
            vec![Arc::new(Bm25Retriever::new(corpus.unwrap_or_default()))];
        retrievers.extend(dense);
        Ok(Self::new(retrievers, llm))
    }

    pub fn retriever_names(&self) -> Vec<String> {
        self.retrievers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Run every retriever concurrently and fuse their lists.
    ///
    /// A failing retriever is logged and contributes nothing; the call only
    /// fails when every retriever does.
    pub async fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<FusedDocument>> {
        let results = join_all(
            self.retrievers
                .iter()
                .map(|r| r.retrieve(query, config.top_k)),
        )
        .await;

        let mut lists = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (retriever, result) in self.retrievers.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(e) => {
                    warn!(retriever = retriever.name(), error = %e, "retriever failed, skipping");
                    failures.push(format!("{}: {e}", retriever.name()));
                }
            }
        }
        if lists.is_empty() && !failures.is_empty() {
            return Err(StrataError::Retrieval {
                retriever: "all".into(),
                reason: failures.join("; "),
            });
        }

        let fused = reciprocal_rank_fusion(&lists);
        debug!(lists = lists.len(), fused = fused.len(), "fusion complete");

        let reranker = if config.use_external_rerank {
            match &self.reranker {
                Some(r) => Some(r.as_ref()),
                None => {
                    return Err(StrataError::Rerank(
                        "external rerank requested but no reranker is configured".into(),
                    ));
                }
            }
        } else {
            None
        };
        rerank(query, fused, config.rerank_top_n, reranker).await
    }

    /// Answer `query` from the knowledge base, returning the passages used.
    pub async fn answer_with_sources(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<(String, Vec<FusedDocument>)> {
        let passages = self.retrieve(query, config).await?;
        let context = passages
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = LlmRequest::prompt(&self.model, build_prompt(&context, query))
            .with_limits(self.max_tokens, self.temperature);
        let response = self.llm.complete(&request).await?;
        Ok((response.text(), passages))
    }

    pub async fn retrieval_answer(&self, query: &str, config: &RetrievalConfig) -> Result<String> {
        let (answer, _) = self.answer_with_sources(query, config).await?;
        Ok(answer)
    }
}
