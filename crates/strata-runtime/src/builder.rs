use std::sync::Arc;
use tracing::info;

use strata_config::{EmbeddingConfig, RagConfig, StrataConfig};
use strata_core::{Result, StrataError};
use strata_llm::{EmbeddingProvider, HashEmbedding, LlmProvider, OllamaEmbedding, OpenAiEmbedding, OpenAiProvider};
use strata_memory::{ConversationBuffer, LongTermStore, MemoryStore, SqliteVectorIndex, TaskScratchpad, VectorIndex};
use strata_retrieval::{CohereReranker, RetrievalConfig, RetrievalPipeline};

use crate::agent::Agent;
use crate::bridge::{AsyncBridge, BridgeConfig, BridgeError};
use crate::tools::PatentTools;

/// The bridge type the transports talk to.
pub type AgentBridge = AsyncBridge<Agent>;

pub fn embedder_for(embedding: &EmbeddingConfig, config: &StrataConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match embedding.provider.as_str() {
        "ollama" => {
            let mut e = OllamaEmbedding::new(&embedding.model, embedding.dims);
            if let Some(url) = &embedding.base_url {
                e = e.with_base_url(url.clone());
            }
            Arc::new(e)
        }
        "openai" => {
            let key = config.services.llm_api_key.clone().unwrap_or_default();
            let mut e = OpenAiEmbedding::new(key).with_model(embedding.model.clone(), embedding.dims);
            if let Some(url) = &embedding.base_url {
                e = e.with_base_url(url.clone());
            }
            Arc::new(e)
        }
        "hash" => Arc::new(HashEmbedding::new(embedding.dims)),
        other => {
            return Err(StrataError::Config(format!("unknown embedding provider '{other}'")));
        }
    };
    Ok(embedder)
}

pub fn retrieval_config(rag: &RagConfig) -> RetrievalConfig {
    RetrievalConfig {
        top_k: rag.top_k,
        rerank_top_n: rag.rerank_top_n,
        use_external_rerank: rag.use_external_rerank,
        index_root: rag.index_root.clone(),
    }
}

pub fn llm_for(config: &StrataConfig) -> Arc<dyn LlmProvider> {
    let key = config.services.llm_api_key.clone().unwrap_or_default();
    Arc::new(OpenAiProvider::new(key).with_base_url(config.services.llm_api_base.clone(), "qwen".into()))
}

/// Open the memory store described by `config.memory`.
pub fn build_memory(config: &StrataConfig) -> Result<MemoryStore> {
    let memory = &config.memory;
    let embedder = embedder_for(&memory.embedding, config)?;
    let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open(&memory.db_path)?);
    Ok(MemoryStore::new(
        ConversationBuffer::new(memory.short_term_size),
        TaskScratchpad::new(memory.scratchpad_size),
        LongTermStore::new(embedder, index),
    ))
}

/// Open one index per configured representation and attach the reranker.
pub async fn build_retrieval(config: &StrataConfig, llm: Arc<dyn LlmProvider>) -> Result<RetrievalPipeline> {
    let rag = &config.retrieval;
    let mut representations = Vec::with_capacity(rag.representations.len());
    for representation in &rag.representations {
        representations.push((RagConfig::index_tag(representation), embedder_for(representation, config)?));
    }

    let mut pipeline = RetrievalPipeline::open(&retrieval_config(rag), llm, representations)
        .await?
        .with_model(rag.model.clone(), rag.temperature);
    if let Some(key) = config.services.cohere_api_key.clone().filter(|k| !k.is_empty()) {
        pipeline = pipeline.with_reranker(Arc::new(
            CohereReranker::new(key)
                .with_base_url(config.services.cohere_api_base.clone())
                .with_model(rag.rerank_model.clone()),
        ));
    }
    Ok(pipeline)
}

/// Wire the full agent from configuration.
pub async fn build_agent(config: &StrataConfig) -> Result<Agent> {
    let llm = llm_for(config);
    let memory = build_memory(config)?;
    let pipeline = build_retrieval(config, Arc::clone(&llm)).await?;
    let tools = PatentTools::new(config.services.backend_base_url.clone())
        .with_retrieval(Arc::new(pipeline), retrieval_config(&config.retrieval));

    info!(
        model = %config.agent.model,
        db = %config.memory.db_path.display(),
        representations = config.retrieval.representations.len(),
        "agent built"
    );
    Ok(Agent::new(memory, llm, Arc::new(tools), config.agent.clone())
        .with_context_limits(config.memory.context_history_limit, config.memory.long_term_top_k))
}

/// Start the scheduler thread and build a connected agent on it.
pub fn start_agent(config: StrataConfig) -> std::result::Result<AgentBridge, BridgeError> {
    let bridge_config = BridgeConfig::from(&config.bridge);
    AsyncBridge::start(bridge_config, move || async move {
        let mut agent = build_agent(&config).await?;
        agent.connect().await?;
        Ok(agent)
    })
}
