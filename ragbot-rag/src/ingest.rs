//! Ingestion: normalise, split, embed and store texts under a namespace

use crate::chunking::{normalize_text, RecursiveTextSplitter};
use crate::embeddings::Embedder;
use crate::resilience::{guarded, CallPolicy, Upstream};
use crate::storage::VectorStore;
use crate::types::{
    ChunkRecord, IngestReport, IngestRequest, Namespace, RagError, RagResult, UpstreamKind,
};
use ragbot_core::{log_operation_start, log_operation_success, process_concurrently, RagbotConfig};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Stable id for a chunk: the same text in the same namespace maps to the same id
pub fn chunk_id(namespace: &Namespace, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

struct PendingChunk {
    id: String,
    content: String,
    metadata: BTreeMap<String, String>,
}

pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    splitter: RecursiveTextSplitter,
    default_namespace: Namespace,
    batch_size: usize,
    max_concurrency: usize,
    embed_policy: CallPolicy,
    store_policy: CallPolicy,
}

impl Ingestor {
    pub fn new(
        config: &RagbotConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> RagResult<Self> {
        Ok(Self {
            embedder,
            store,
            splitter: RecursiveTextSplitter::from_config(&config.chunking)?,
            default_namespace: Namespace::parse(&config.retrieval.default_namespace)?,
            batch_size: config.embedding.batch_size.max(1),
            max_concurrency: config.embedding.max_concurrency.max(1),
            embed_policy: CallPolicy::for_embedding(config),
            store_policy: CallPolicy::for_store(config),
        })
    }

    pub fn default_namespace(&self) -> &Namespace {
        &self.default_namespace
    }

    /// Ingest a batch of texts. Either every chunk is stored or, when embedding
    /// fails, none is.
    pub async fn ingest(&self, request: IngestRequest) -> RagResult<IngestReport> {
        if request.texts.is_empty() {
            return Err(RagError::validation(
                "texts",
                "at least one text is required",
            ));
        }
        let namespace = Namespace::resolve(request.namespace.as_deref(), &self.default_namespace)?;

        log_operation_start!(
            "ingest",
            namespace = %namespace,
            documents = request.texts.len()
        );

        let pending = self.split_documents(&request.texts, &request.metadata, &namespace);
        let num_chunks = self.store_chunks(&namespace, pending).await?;

        log_operation_success!("ingest", namespace = %namespace, chunks = num_chunks);

        Ok(IngestReport {
            status: "ok".to_string(),
            num_documents: request.texts.len(),
            num_chunks,
            namespace,
        })
    }

    fn split_documents(
        &self,
        texts: &[String],
        metadata: &BTreeMap<String, String>,
        namespace: &Namespace,
    ) -> Vec<PendingChunk> {
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        for (doc_index, text) in texts.iter().enumerate() {
            let normalized = normalize_text(text);
            if normalized.is_empty() {
                debug!(doc_index, "Skipping empty document");
                continue;
            }

            for (chunk_index, content) in self.splitter.split_text(&normalized).into_iter().enumerate() {
                // identical chunks share an id and would collapse into one row
                let id = chunk_id(namespace, &content);
                if !seen.insert(id.clone()) {
                    debug!(doc_index, chunk_index, "Skipping duplicate chunk");
                    continue;
                }

                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert("namespace".to_string(), namespace.to_string());
                chunk_metadata.insert("chunk_index".to_string(), chunk_index.to_string());
                pending.push(PendingChunk {
                    id,
                    content,
                    metadata: chunk_metadata,
                });
            }
        }
        pending
    }

    async fn store_chunks(&self, namespace: &Namespace, pending: Vec<PendingChunk>) -> RagResult<usize> {
        if pending.is_empty() {
            return Ok(0);
        }

        let batches: Vec<Vec<String>> = pending
            .chunks(self.batch_size)
            .map(|batch| batch.iter().map(|c| c.content.clone()).collect())
            .collect();
        let batch_count = batches.len();

        let embedded = process_concurrently(batches, self.max_concurrency, |texts| async move {
            guarded(&self.embed_policy, Upstream::Model, "embed_chunks", || {
                self.embedder.embed_batch(&texts)
            })
            .await
        })
        .await;

        let mut vectors = Vec::with_capacity(pending.len());
        for batch in embedded {
            vectors.extend(batch?);
        }
        if vectors.len() != pending.len() {
            return Err(RagError::model(
                UpstreamKind::Malformed,
                format!("Expected {} embeddings, got {}", pending.len(), vectors.len()),
            ));
        }

        let records: Vec<ChunkRecord> = pending
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| ChunkRecord {
                id: chunk.id,
                namespace: namespace.clone(),
                content: chunk.content,
                metadata: chunk.metadata,
                embedding,
            })
            .collect();

        debug!(namespace = %namespace, batches = batch_count, chunks = records.len(), "Embedded chunks");

        let mut stored = 0;
        for batch in records.chunks(self.batch_size) {
            stored += guarded(&self.store_policy, Upstream::Store, "upsert_chunks", || {
                self.store.upsert(namespace, batch.to_vec())
            })
            .await?;
        }

        Ok(stored)
    }
}
