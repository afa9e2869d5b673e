//! # strata-llm
//!
//! Abstraction layer over chat-completion and embedding backends. Any
//! OpenAI-compatible endpoint (DashScope/Qwen, OpenAI, vLLM) works through
//! [`OpenAiProvider`].

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod provider;

pub use embedding::{EmbeddingProvider, HashEmbedding, OllamaEmbedding, OpenAiEmbedding};
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
