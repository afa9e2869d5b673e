use async_trait::async_trait;
use tracing::debug;

use strata_core::{Result, StrataError};

use crate::document::FusedDocument;

/// Semantic reranking service.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Indices into `documents`, most relevant first, at most `top_n` of them.
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<usize>>;
}

/// Reorder fused candidates and keep `top_n`.
///
/// Without a reranker the first `top_n` pass through unchanged. Indices the
/// reranker returns out of range (or twice) are dropped.
pub async fn rerank(
    query: &str,
    fused: Vec<FusedDocument>,
    top_n: usize,
    reranker: Option<&dyn Reranker>,
) -> Result<Vec<FusedDocument>> {
    let Some(reranker) = reranker else {
        return Ok(fused.into_iter().take(top_n).collect());
    };
    if fused.is_empty() {
        return Ok(fused);
    }

    let texts: Vec<String> = fused.iter().map(|d| d.content.clone()).collect();
    let order = reranker.rerank(query, &texts, top_n).await?;
    debug!(reranker = reranker.name(), returned = order.len(), "rerank complete");

    let mut slots: Vec<Option<FusedDocument>> = fused.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .take(top_n)
        .collect())
}

/// Cohere rerank API client.
pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl CohereReranker {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.cohere.ai".into(),
            model: "rerank-english-v2.0".into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Extract `results[].index` from a rerank response.
    pub fn parse_response(data: &serde_json::Value) -> Result<Vec<usize>> {
        let results = data["results"]
            .as_array()
            .ok_or_else(|| StrataError::Rerank("response has no results array".into()))?;
        Ok(results
            .iter()
            .filter_map(|r| r["index"].as_u64().map(|i| i as usize))
            .collect())
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<usize>> {
        let body = serde_json::json!({
            "query": query,
            "documents": documents,
            "top_n": top_n,
            "model": &self.model,
        });

        let resp = self
            .client
            .post(format!("{}/v1/rerank", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| StrataError::Rerank(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(StrataError::Rerank(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StrataError::Rerank(e.to_string()))?;
        Self::parse_response(&data)
    }
}
