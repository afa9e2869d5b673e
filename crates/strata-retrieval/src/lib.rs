//! # strata-retrieval
//!
//! Knowledge-base question answering. One lexical retriever and several
//! embedding-based retrievers each rank passages independently; their lists
//! are merged with reciprocal rank fusion, optionally reranked by an external
//! service, and handed to the LLM as reference content.

pub mod bm25;
pub mod document;
pub mod fusion;
pub mod pipeline;
pub mod rerank;
pub mod vector;

pub use bm25::Bm25Retriever;
pub use document::{FusedDocument, RetrievedDocument, Retriever};
pub use fusion::{RRF_K, reciprocal_rank_fusion};
pub use pipeline::{RetrievalConfig, RetrievalPipeline};
pub use rerank::{CohereReranker, Reranker, rerank};
pub use vector::VectorRetriever;
