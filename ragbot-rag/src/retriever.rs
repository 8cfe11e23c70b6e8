//! Document retrieval
//!
//! Embeds the standalone question and pulls the closest chunks of one
//! namespace from the vector store.

use crate::embeddings::Embedder;
use crate::resilience::{guarded, CallPolicy, Upstream};
use crate::storage::VectorStore;
use crate::types::{Namespace, RagResult, RetrievedChunk, ScoredChunk};
use ragbot_core::{RagbotConfig, RetrievalConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

pub struct DocumentRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    embed_policy: CallPolicy,
    store_policy: CallPolicy,
}

impl DocumentRetriever {
    pub fn new(
        config: &RagbotConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            config: config.retrieval.clone(),
            embed_policy: CallPolicy::for_embedding(config),
            store_policy: CallPolicy::for_store(config),
        }
    }

    /// Up to `top_k` chunks of `namespace`, most relevant first
    pub async fn retrieve(
        &self,
        query: &str,
        namespace: &Namespace,
        top_k: usize,
    ) -> RagResult<Vec<RetrievedChunk>> {
        let start_time = Instant::now();
        let top_k = top_k.clamp(1, self.config.max_top_k);

        let query_embedding = guarded(&self.embed_policy, Upstream::Model, "embed_query", || {
            self.embedder.embed(query)
        })
        .await?;

        let candidates = guarded(&self.store_policy, Upstream::Store, "vector_query", || {
            self.store.query(namespace, &query_embedding, top_k)
        })
        .await?;
        let candidate_count = candidates.len();

        let results = self.filter_by_context_length(self.filter_candidates(candidates, namespace));
        debug_assert!(results.len() <= top_k);

        info!(
            namespace = %namespace,
            top_k,
            candidates = candidate_count,
            returned = results.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Retrieved chunks"
        );

        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }

    /// Drop chunks from a foreign namespace or below the similarity threshold
    fn filter_candidates(
        &self,
        candidates: Vec<ScoredChunk>,
        namespace: &Namespace,
    ) -> Vec<ScoredChunk> {
        candidates
            .into_iter()
            .filter(|chunk| {
                let owner = chunk.metadata.get("namespace").map(String::as_str);
                if owner != Some(namespace.as_str()) {
                    error!(
                        chunk_id = %chunk.id,
                        expected = %namespace,
                        found = ?owner,
                        "Vector store returned a chunk from another namespace"
                    );
                    return false;
                }
                true
            })
            .filter(|chunk| match self.config.similarity_threshold {
                Some(threshold) => chunk.score >= threshold,
                None => true,
            })
            .collect()
    }

    /// Keep chunks while their summed length fits the context budget.
    /// The best chunk is always kept.
    fn filter_by_context_length(&self, results: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let original_count = results.len();
        let mut filtered = Vec::with_capacity(original_count);
        let mut total_length = 0;

        for result in results {
            let length = result.content.chars().count();
            if !filtered.is_empty() && total_length + length > self.config.max_context_chars {
                break;
            }
            total_length += length;
            filtered.push(result);
        }

        if filtered.len() < original_count {
            debug!(
                from = original_count,
                to = filtered.len(),
                limit = self.config.max_context_chars,
                "Trimmed retrieval results to the context budget"
            );
        }

        filtered
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryVectorStore;
    use crate::testing::{HashEmbedder, UnavailableStore};
    use crate::types::{ChunkRecord, RagError};
    use std::collections::BTreeMap;

    fn record(ns: &Namespace, id: &str, content: &str, embedder: &HashEmbedder) -> ChunkRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("namespace".to_string(), ns.to_string());
        ChunkRecord {
            id: id.into(),
            namespace: ns.clone(),
            content: content.into(),
            metadata,
            embedding: embedder.vector(content),
        }
    }

    async fn seeded(config: &RagbotConfig) -> (DocumentRetriever, Namespace) {
        let embedder = Arc::new(HashEmbedder::new());
        let store = Arc::new(InMemoryVectorStore::new());
        let ns = Namespace::parse("kb-1").unwrap();
        store
            .upsert(
                &ns,
                vec![
                    record(&ns, "a", "The sky is blue.", &embedder),
                    record(&ns, "b", "Grass is green in spring.", &embedder),
                    record(&ns, "c", "Rust has a borrow checker.", &embedder),
                ],
            )
            .await
            .unwrap();
        (DocumentRetriever::new(config, embedder, store), ns)
    }

    #[tokio::test]
    async fn test_retrieve_respects_top_k_and_namespace() {
        let (retriever, ns) = seeded(&RagbotConfig::default()).await;

        let results = retriever.retrieve("What color is the sky?", &ns, 2).await.unwrap();
        assert!(results.len() <= 2);
        assert_eq!(results[0].id, "a");
        assert!(results
            .iter()
            .all(|r| r.metadata.get("namespace").map(String::as_str) == Some("kb-1")));

        let other = Namespace::parse("kb-2").unwrap();
        assert!(retriever.retrieve("sky", &other, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similarity_threshold() {
        let mut config = RagbotConfig::default();
        config.retrieval.similarity_threshold = Some(0.99);
        let (retriever, ns) = seeded(&config).await;

        let results = retriever.retrieve("completely unrelated words", &ns, 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_context_budget_keeps_best_chunk() {
        let mut config = RagbotConfig::default();
        config.retrieval.max_context_chars = 5;
        let (retriever, ns) = seeded(&config).await;

        let results = retriever.retrieve("sky blue", &ns, 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "The sky is blue.");
    }

    #[tokio::test]
    async fn test_store_failure_is_upstream_store_error() {
        let mut config = RagbotConfig::default();
        config.retry.max_attempts = 1;
        let retriever = DocumentRetriever::new(
            &config,
            Arc::new(HashEmbedder::new()),
            Arc::new(UnavailableStore),
        );
        let ns = Namespace::parse("kb-1").unwrap();

        let err = retriever.retrieve("anything", &ns, 3).await.unwrap_err();
        assert!(matches!(err, RagError::UpstreamStore { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_model_error() {
        let mut config = RagbotConfig::default();
        config.retry.max_attempts = 1;
        let retriever = DocumentRetriever::new(
            &config,
            Arc::new(HashEmbedder::failing()),
            Arc::new(InMemoryVectorStore::new()),
        );
        let ns = Namespace::parse("kb-1").unwrap();

        let err = retriever.retrieve("anything", &ns, 3).await.unwrap_err();
        assert!(matches!(err, RagError::UpstreamModel { .. }));
    }
}
