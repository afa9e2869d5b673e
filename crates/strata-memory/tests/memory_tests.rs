#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use strata_core::{MemoryType, Result, Role, StrataError};
    use strata_llm::{EmbeddingProvider, HashEmbedding};
    use strata_memory::*;

    /// Wraps a real index, recording query filters and optionally failing deletes.
    struct ObservedIndex {
        inner: SqliteVectorIndex,
        queries: Mutex<Vec<MetadataFilter>>,
        fail_deletes: bool,
    }

    impl ObservedIndex {
        fn new(fail_deletes: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: SqliteVectorIndex::open_in_memory().unwrap(),
                queries: Mutex::new(vec![]),
                fail_deletes,
            })
        }
    }

    #[async_trait]
    impl VectorIndex for ObservedIndex {
        async fn upsert(&self, record: IndexRecord) -> Result<()> {
            self.inner.upsert(record).await
        }
        async fn query(
            &self,
            embedding: &[f32],
            filter: &MetadataFilter,
            top_k: usize,
        ) -> Result<Vec<IndexHit>> {
            self.queries.lock().push(filter.clone());
            self.inner.query(embedding, filter, top_k).await
        }
        async fn get(&self, ids: &[String]) -> Result<Vec<IndexHit>> {
            self.inner.get(ids).await
        }
        async fn delete(&self, ids: &[String]) -> Result<usize> {
            if self.fail_deletes {
                return Err(StrataError::Index("delete unavailable".into()));
            }
            self.inner.delete(ids).await
        }
        async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<IndexHit>> {
            self.inner.get_where(filter).await
        }
        async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize> {
            self.inner.delete_where(filter).await
        }
        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(StrataError::Embedding("model offline".into()))
        }
        fn dimensions(&self) -> usize {
            64
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashEmbedding::new(64))
    }

    fn store_over(index: Arc<dyn VectorIndex>) -> MemoryStore {
        MemoryStore::new(
            ConversationBuffer::new(20),
            TaskScratchpad::new(10),
            LongTermStore::new(embedder(), index),
        )
    }

    // ── Long-term upsert ───────────────────────────────────────

    mod upsert {
        use super::*;

        #[tokio::test]
        async fn last_write_wins_with_one_record() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            store
                .upsert_long_term("u1", "pref", "tea", MemoryType::Semantic)
                .await
                .unwrap();
            store
                .upsert_long_term("u1", "pref", "coffee", MemoryType::Semantic)
                .await
                .unwrap();
            assert_eq!(store.get_long_term("u1", "pref", None).await.as_deref(), Some("coffee"));
            assert_eq!(store.long_term.index().count().await.unwrap(), 1);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn concurrent_writes_of_one_identity_leave_one_record() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store
                            .upsert_long_term("u1", "pref", &format!("drink {i}"), MemoryType::Semantic)
                            .await
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
            assert_eq!(store.long_term.index().count().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn failed_delete_is_ignored() {
            let store = store_over(ObservedIndex::new(true));
            store
                .upsert_long_term("u1", "pref", "tea", MemoryType::Semantic)
                .await
                .unwrap();
            assert_eq!(store.get_long_term("u1", "pref", None).await.as_deref(), Some("tea"));
        }

        #[tokio::test]
        async fn embedding_failure_propagates() {
            let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open_in_memory().unwrap());
            let long_term = LongTermStore::new(Arc::new(BrokenEmbedder), index);
            let err = long_term
                .upsert("u1", "pref", "tea", MemoryType::Semantic)
                .await
                .unwrap_err();
            assert!(matches!(err, StrataError::Embedding(_)));
        }

        #[tokio::test]
        async fn dimension_mismatch_is_rejected() {
            let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open_in_memory().unwrap());
            let wide = LongTermStore::new(Arc::new(HashEmbedding::new(64)), Arc::clone(&index));
            let narrow = LongTermStore::new(Arc::new(HashEmbedding::new(32)), index);
            wide.upsert("u1", "a", "first", MemoryType::Semantic).await.unwrap();
            let err = narrow
                .upsert("u1", "b", "second", MemoryType::Semantic)
                .await
                .unwrap_err();
            assert!(matches!(err, StrataError::DimensionMismatch { expected: 64, actual: 32 }));
        }

        #[tokio::test]
        async fn business_data_is_episodic() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            store.add_business_data("u1", "patent", "P1: solar cell").await.unwrap();
            let hits = store
                .long_term
                .index()
                .get(&["u1:episodic:business_patent".to_string()])
                .await
                .unwrap();
            assert_eq!(hits[0].document, "P1: solar cell");
            assert_eq!(hits[0].metadata["type"], "episodic");
        }
    }

    // ── Long-term reads ────────────────────────────────────────

    mod reads {
        use super::*;

        #[tokio::test]
        async fn exact_lookup_probes_legacy_ids() {
            let index = Arc::new(SqliteVectorIndex::open_in_memory().unwrap());
            let mut metadata = serde_json::Map::new();
            metadata.insert("user_id".into(), "u1".into());
            metadata.insert("key".into(), "pref".into());
            index
                .upsert(IndexRecord {
                    id: "u1:pref".into(),
                    embedding: vec![1.0; 64],
                    document: "legacy value".into(),
                    metadata,
                })
                .await
                .unwrap();
            let store = store_over(index);
            assert_eq!(
                store.get_long_term("u1", "pref", Some(MemoryType::Episodic)).await.as_deref(),
                Some("legacy value")
            );
        }

        #[tokio::test]
        async fn exact_lookup_falls_back_across_types() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            store
                .upsert_long_term("u1", "visit", "came on monday", MemoryType::Episodic)
                .await
                .unwrap();
            assert_eq!(
                store.get_long_term("u1", "visit", None).await.as_deref(),
                Some("came on monday")
            );
            assert!(store.get_long_term("u1", "absent", None).await.is_none());
        }

        #[tokio::test]
        async fn query_is_scoped_to_user_and_type() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            store.upsert_long_term("u1", "a", "solar panels", MemoryType::Semantic).await.unwrap();
            store.upsert_long_term("u2", "a", "solar panels", MemoryType::Semantic).await.unwrap();
            store.upsert_long_term("u1", "b", "solar visit", MemoryType::Episodic).await.unwrap();

            let recall = store.search_long_term("u1", "solar", 5, Some(MemoryType::Semantic)).await;
            assert_eq!(recall, Recall::Found(vec!["solar panels".into()]));
            let all = store.search_long_term("u1", "solar", 5, None).await.into_hits();
            assert_eq!(all.len(), 2);
        }

        #[tokio::test]
        async fn unknown_user_is_empty() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            assert_eq!(store.search_long_term("nobody", "x", 3, None).await, Recall::Empty);
        }

        #[tokio::test]
        async fn read_failure_is_unavailable_not_an_error() {
            let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open_in_memory().unwrap());
            let long_term = LongTermStore::new(Arc::new(BrokenEmbedder), index);
            let recall = long_term.query_semantic("u1", "anything", 3, None).await;
            assert!(matches!(recall, Recall::Unavailable(_)));
            assert!(recall.into_hits().is_empty());
        }

        #[tokio::test]
        async fn delete_all_wipes_only_that_user() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            store.upsert_long_term("u1", "a", "one", MemoryType::Semantic).await.unwrap();
            store.upsert_long_term("u1", "b", "two", MemoryType::Episodic).await.unwrap();
            store.upsert_long_term("u2", "a", "three", MemoryType::Semantic).await.unwrap();
            assert_eq!(store.clear_long_term("u1").await.unwrap(), 2);
            assert_eq!(store.long_term.list_all("u1", None).await, Recall::Empty);
            assert!(store.long_term.list_all("u2", None).await.is_found());
        }
    }

    // ── Context assembly ───────────────────────────────────────

    mod context {
        use super::*;

        #[tokio::test]
        async fn scenario_history_and_profile_are_both_returned() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            store.add_turn("S", Role::User, "what's new in energy?");
            store
                .upsert_long_term("U", "interest", "likes renewable energy", MemoryType::Semantic)
                .await
                .unwrap();

            let context = store
                .get_context("U", "S", "renewable energy policy", 10, 3)
                .await;
            assert_eq!(context.history.len(), 1);
            assert_eq!(context.history[0].text, "what's new in energy?");
            assert_eq!(
                context.profile,
                Profile::Facts(vec!["likes renewable energy".into()])
            );
            assert_eq!(context.relevant_long_term, vec!["likes renewable energy".to_string()]);
        }

        #[tokio::test]
        async fn empty_episodic_match_triggers_unscoped_query() {
            let index = ObservedIndex::new(false);
            let store = store_over(index.clone());
            store
                .upsert_long_term("U", "interest", "likes wind power", MemoryType::Semantic)
                .await
                .unwrap();

            store.get_context("U", "S", "wind", 10, 3).await;
            let queries = index.queries.lock();
            assert_eq!(queries.len(), 2);
            let episodic = serde_json::Map::from_iter([
                ("user_id".to_string(), serde_json::json!("U")),
                ("type".to_string(), serde_json::json!("semantic")),
            ]);
            // First query is scoped to episodic, so a semantic record does not match it.
            assert!(!queries[0].matches(&episodic));
            assert!(queries[1].matches(&episodic));
        }

        #[tokio::test]
        async fn episodic_hit_skips_the_fallback() {
            let index = ObservedIndex::new(false);
            let store = store_over(index.clone());
            store
                .upsert_long_term("U", "visit", "asked about wind farms", MemoryType::Episodic)
                .await
                .unwrap();
            let context = store.get_context("U", "S", "wind", 10, 3).await;
            assert_eq!(index.queries.lock().len(), 1);
            assert_eq!(context.relevant_long_term.len(), 1);
        }

        #[tokio::test]
        async fn empty_query_does_not_fall_back() {
            let index = ObservedIndex::new(false);
            let store = store_over(index.clone());
            store.get_context("U", "S", "", 10, 3).await;
            assert_eq!(index.queries.lock().len(), 1);
        }

        #[tokio::test]
        async fn history_limit_and_working_memory() {
            let store = MemoryStore::in_memory(embedder()).unwrap();
            for i in 0..15 {
                store.add_turn("S", Role::User, format!("turn {i}"));
            }
            store.scratchpad.add_text("S", "plan", "check patents");
            let context = store.get_context("U", "S", "", 10, 3).await;
            assert_eq!(context.history.len(), 10);
            assert_eq!(context.history[0].text, "turn 5");
            assert_eq!(context.working[0].value, "check patents");

            store.clear_short_term("S");
            let context = store.get_context("U", "S", "", 10, 3).await;
            assert!(context.history.is_empty());
            assert!(context.working.is_empty());
        }
    }
}
