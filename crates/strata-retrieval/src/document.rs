use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::Result;

/// A passage as ranked by one retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    /// Name of the retriever that produced it.
    pub source: String,
    /// 0-based position in that retriever's list.
    pub rank: usize,
}

/// A passage after fusion, with its accumulated reciprocal-rank score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDocument {
    pub content: String,
    pub score: f64,
    /// Retrievers that returned this passage, in input order.
    pub sources: Vec<String>,
}

/// One independent ranking of the knowledge base.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `k` passages, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>>;
}

/// Tag a ranked list of passages with their source and rank.
pub(crate) fn ranked(source: &str, contents: impl IntoIterator<Item = String>) -> Vec<RetrievedDocument> {
    contents
        .into_iter()
        .enumerate()
        .map(|(rank, content)| RetrievedDocument {
            content,
            source: source.to_string(),
            rank,
        })
        .collect()
}
