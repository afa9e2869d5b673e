#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Arc;
    use strata_core::{Result, StrataError};
    use strata_llm::{EmbeddingProvider, HashEmbedding, LlmProvider, MockProvider};
    use strata_memory::{IndexRecord, SqliteVectorIndex, VectorIndex};
    use strata_retrieval::pipeline::build_prompt;
    use strata_retrieval::*;

    const PASSAGES: [&str; 3] = [
        "Patent P1 describes a perovskite solar cell with improved efficiency.",
        "Patent P2 covers a wind turbine blade pitch controller.",
        "Patent P3 claims a lithium battery thermal management system.",
    ];

    async fn seed(root: &std::path::Path, tag: &str, embedder: &HashEmbedding) {
        let index = SqliteVectorIndex::open(&root.join(format!("{tag}.db"))).unwrap();
        for (i, passage) in PASSAGES.iter().enumerate() {
            index
                .upsert(IndexRecord {
                    id: format!("chunk-{i}"),
                    embedding: embedder.embed_text(passage),
                    document: passage.to_string(),
                    metadata: serde_json::Map::new(),
                })
                .await
                .unwrap();
        }
    }

    fn representations(tags: &[&str]) -> Vec<(String, Arc<dyn EmbeddingProvider>)> {
        tags.iter()
            .map(|t| (t.to_string(), Arc::new(HashEmbedding::new(256)) as Arc<dyn EmbeddingProvider>))
            .collect()
    }

    struct Broken;

    #[async_trait]
    impl Retriever for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedDocument>> {
            Err(StrataError::Retrieval {
                retriever: "broken".into(),
                reason: "index offline".into(),
            })
        }
    }

    #[tokio::test]
    async fn open_builds_lexical_plus_dense_retrievers() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashEmbedding::new(256);
        seed(dir.path(), "bge", &embedder).await;
        seed(dir.path(), "e5", &embedder).await;

        let config = RetrievalConfig {
            index_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock"));
        let pipeline = RetrievalPipeline::open(&config, llm, representations(&["bge", "e5"]))
            .await
            .unwrap();
        assert_eq!(pipeline.retriever_names(), vec!["bm25", "bge", "e5"]);

        let fused = pipeline.retrieve("solar cell efficiency", &config).await.unwrap();
        assert_eq!(fused[0].content, PASSAGES[0]);
        assert_eq!(fused[0].sources.len(), 3);
        // Every passage appears once no matter how many retrievers returned it.
        assert_eq!(fused.len(), 3);
    }

    #[tokio::test]
    async fn answer_uses_the_fixed_template() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "bge", &HashEmbedding::new(256)).await;
        let config = RetrievalConfig {
            index_root: dir.path().to_path_buf(),
            rerank_top_n: 2,
            ..Default::default()
        };
        let mock = Arc::new(MockProvider::new("mock").with_response("P1 is about solar cells."));
        let pipeline = RetrievalPipeline::open(&config, mock.clone(), representations(&["bge"]))
            .await
            .unwrap();

        let (answer, sources) = pipeline
            .answer_with_sources("What does the solar patent cover?", &config)
            .await
            .unwrap();
        assert_eq!(answer, "P1 is about solar cells.");
        assert_eq!(sources.len(), 2);

        let requests = mock.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "qwen-turbo");
        assert_eq!(requests[0].temperature, 0.2);
        let prompt = requests[0].messages[0].text_content();
        let context = format!("{}\n\n{}", sources[0].content, sources[1].content);
        assert_eq!(prompt, build_prompt(&context, "What does the solar patent cover?"));
        assert!(prompt.starts_with("Answer the question based on the reference content below."));
        assert!(prompt.ends_with("Give a concise and accurate answer:"));
    }

    #[tokio::test]
    async fn missing_index_yields_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let config = RetrievalConfig {
            index_root: dir.path().join("fresh"),
            ..Default::default()
        };
        let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock").with_response("general"));
        let pipeline = RetrievalPipeline::open(&config, llm, representations(&["bge"]))
            .await
            .unwrap();
        assert!(pipeline.retrieve("anything", &config).await.unwrap().is_empty());
        assert_eq!(pipeline.retrieval_answer("anything", &config).await.unwrap(), "general");
    }

    #[tokio::test]
    async fn external_rerank_without_reranker_is_an_error() {
        let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock"));
        let bm25: Arc<dyn Retriever> =
            Arc::new(Bm25Retriever::new(PASSAGES.iter().map(|p| p.to_string())));
        let pipeline = RetrievalPipeline::new(vec![bm25], llm);
        let config = RetrievalConfig {
            use_external_rerank: true,
            ..Default::default()
        };
        let err = pipeline.retrieve("battery", &config).await.unwrap_err();
        assert!(matches!(err, StrataError::Rerank(_)));
    }

    #[tokio::test]
    async fn failing_retriever_is_skipped() {
        let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock"));
        let bm25: Arc<dyn Retriever> =
            Arc::new(Bm25Retriever::new(PASSAGES.iter().map(|p| p.to_string())));
        let pipeline = RetrievalPipeline::new(vec![Arc::new(Broken) as Arc<dyn Retriever>, bm25], llm);
        let fused = pipeline
            .retrieve("battery", &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(fused[0].content, PASSAGES[2]);
    }

    #[tokio::test]
    async fn all_retrievers_failing_is_an_error() {
        let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("mock"));
        let pipeline = RetrievalPipeline::new(vec![Arc::new(Broken) as Arc<dyn Retriever>], llm);
        let err = pipeline
            .retrieve("battery", &RetrievalConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Retrieval { .. }));
    }
}
