use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use strata_core::Result;
use strata_llm::embedding::tokenize;

use crate::document::{RetrievedDocument, Retriever, ranked};

const K1: f64 = 1.5;
const B: f64 = 0.75;

struct Passage {
    content: String,
    term_freqs: HashMap<String, usize>,
    len: usize,
}

/// Okapi BM25 over a fixed in-memory corpus.
pub struct Bm25Retriever {
    name: String,
    passages: Vec<Passage>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Retriever {
    pub fn new(corpus: impl IntoIterator<Item = String>) -> Self {
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let passages: Vec<Passage> = corpus
            .into_iter()
            .map(|content| {
                let tokens = tokenize(&content);
                let mut term_freqs: HashMap<String, usize> = HashMap::new();
                for t in &tokens {
                    *term_freqs.entry(t.clone()).or_default() += 1;
                }
                for t in term_freqs.keys() {
                    *doc_freqs.entry(t.clone()).or_default() += 1;
                }
                Passage {
                    content,
                    term_freqs,
                    len: tokens.len(),
                }
            })
            .collect();
        let total: usize = passages.iter().map(|p| p.len).sum();
        let avg_len = if passages.is_empty() {
            0.0
        } else {
            total as f64 / passages.len() as f64
        };
        Self {
            name: "bm25".into(),
            passages,
            doc_freqs,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.passages.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Scores of every passage with a positive score, best first. Ties keep corpus order.
    pub fn score(&self, query: &str) -> Vec<(usize, f64)> {
        let terms = tokenize(query);
        let mut scored: Vec<(usize, f64)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let norm = if self.avg_len > 0.0 {
                    1.0 - B + B * p.len as f64 / self.avg_len
                } else {
                    1.0
                };
                let score: f64 = terms
                    .iter()
                    .map(|t| {
                        let tf = p.term_freqs.get(t).copied().unwrap_or(0) as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        self.idf(t) * tf * (K1 + 1.0) / (tf + K1 * norm)
                    })
                    .sum();
                (i, score)
            })
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let hits: Vec<String> = self
            .score(query)
            .into_iter()
            .take(k)
            .map(|(i, _)| self.passages[i].content.clone())
            .collect();
        debug!(hits = hits.len(), "bm25 retrieval");
        Ok(ranked(&self.name, hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_words_and_cjk_characters() {
        assert_eq!(tokenize("Solar-Cell 专利, v2"), vec!["solar", "cell", "专", "利", "v2"]);
    }

    #[tokio::test]
    async fn ranks_matching_passages_first() {
        let bm25 = Bm25Retriever::new(vec![
            "wind turbine blade design".to_string(),
            "solar cell efficiency improvements for solar panels".to_string(),
            "battery storage".to_string(),
        ]);
        let hits = bm25.retrieve("solar efficiency", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "solar cell efficiency improvements for solar panels");
        assert_eq!(hits[0].source, "bm25");
        assert_eq!(hits[0].rank, 0);
    }

    #[tokio::test]
    async fn rarer_terms_weigh_more() {
        let bm25 = Bm25Retriever::new(vec![
            "patent claims patent".to_string(),
            "patent graphene".to_string(),
            "patent filing".to_string(),
        ]);
        let hits = bm25.retrieve("patent graphene", 3).await.unwrap();
        assert_eq!(hits[0].content, "patent graphene");
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn chinese_queries_match_per_character() {
        let bm25 = Bm25Retriever::new(vec!["光伏电池专利".to_string(), "风力发电".to_string()]);
        let hits = bm25.retrieve("电池", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "光伏电池专利");
    }

    #[tokio::test]
    async fn empty_corpus_returns_nothing() {
        let bm25 = Bm25Retriever::new(Vec::<String>::new());
        assert!(bm25.is_empty());
        assert!(bm25.retrieve("anything", 5).await.unwrap().is_empty());
    }
}
