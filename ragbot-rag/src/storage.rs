//! Vector storage
//!
//! [`VectorStore`] is partitioned by namespace: a query never sees chunks
//! written under another namespace. Results are ordered by descending score,
//! ties broken by ascending chunk id.

use crate::embeddings::cosine_similarity;
use crate::types::{ChunkRecord, Namespace, RagError, RagResult, ScoredChunk};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace chunks by id. Each chunk is written atomically.
    async fn upsert(&self, namespace: &Namespace, records: Vec<ChunkRecord>) -> RagResult<usize>;

    /// Up to `top_k` chunks of `namespace`, most similar first
    async fn query(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        top_k: usize,
    ) -> RagResult<Vec<ScoredChunk>>;

    async fn count(&self, namespace: &Namespace) -> RagResult<usize>;

    /// Cheap connectivity check for health reporting
    async fn ping(&self) -> RagResult<()>;

    /// Backend name, e.g. `memory` or `sqlite`
    fn backend(&self) -> &'static str;
}

/// Sort by descending score then ascending id, and keep the first `top_k`
pub fn rank(mut scored: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(top_k);
    scored
}

#[derive(Debug, Clone)]
struct StoredChunk {
    content: String,
    metadata: BTreeMap<String, String>,
    embedding: Vec<f32>,
}

/// Process-local store; the default backend and the one tests use
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    partitions: RwLock<HashMap<Namespace, BTreeMap<String, StoredChunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, namespace: &Namespace, records: Vec<ChunkRecord>) -> RagResult<usize> {
        if let Some(stray) = records.iter().find(|r| &r.namespace != namespace) {
            return Err(RagError::store(format!(
                "Chunk {} belongs to namespace {}, not {}",
                stray.id, stray.namespace, namespace
            )));
        }

        let count = records.len();
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(namespace.clone()).or_default();
        for record in records {
            partition.insert(
                record.id,
                StoredChunk {
                    content: record.content,
                    metadata: record.metadata,
                    embedding: record.embedding,
                },
            );
        }

        debug!(namespace = %namespace, count, total = partition.len(), "Upserted chunks");
        Ok(count)
    }

    async fn query(
        &self,
        namespace: &Namespace,
        vector: &[f32],
        top_k: usize,
    ) -> RagResult<Vec<ScoredChunk>> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(namespace) else {
            return Ok(Vec::new());
        };

        let scored = partition
            .iter()
            .map(|(id, chunk)| ScoredChunk {
                id: id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                score: cosine_similarity(vector, &chunk.embedding),
            })
            .collect();

        Ok(rank(scored, top_k))
    }

    async fn count(&self, namespace: &Namespace) -> RagResult<usize> {
        Ok(self
            .partitions
            .read()
            .await
            .get(namespace)
            .map_or(0, BTreeMap::len))
    }

    async fn ping(&self) -> RagResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Row, SqlitePool};
    use std::str::FromStr;
    use std::time::Duration;
    use tracing::info;

    fn store_error(operation: &str, e: impl std::fmt::Display) -> RagError {
        RagError::store(format!("{} failed: {}", operation, e))
    }

    /// Chunks persisted in SQLite. Embeddings are stored as JSON arrays and
    /// scored in process.
    pub struct SqliteVectorStore {
        pool: SqlitePool,
    }

    impl SqliteVectorStore {
        pub async fn connect(database_url: &str, acquire_timeout: Duration) -> RagResult<Self> {
            info!(database_url, "Connecting to SQLite vector store");

            let in_memory = database_url.contains(":memory:");
            let options = SqliteConnectOptions::from_str(database_url)
                .map_err(|e| RagError::Config(format!("Invalid database URL: {}", e)))?
                .create_if_missing(true);

            // every connection to :memory: is its own database
            let pool_options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(5)
            };

            let pool = pool_options
                .acquire_timeout(acquire_timeout)
                .connect_with(options)
                .await
                .map_err(|e| store_error("connect", e))?;

            Self::create_tables(&pool).await?;
            Ok(Self { pool })
        }

        async fn create_tables(pool: &SqlitePool) -> RagResult<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS chunks (
                    namespace TEXT NOT NULL,
                    id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    embedding TEXT NOT NULL,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (namespace, id)
                )
                "#,
            )
            .execute(pool)
            .await
            .map_err(|e| store_error("create chunks table", e))?;
            Ok(())
        }
    }

    #[async_trait]
    impl VectorStore for SqliteVectorStore {
        async fn upsert(
            &self,
            namespace: &Namespace,
            records: Vec<ChunkRecord>,
        ) -> RagResult<usize> {
            let count = records.len();
            for record in records {
                if &record.namespace != namespace {
                    return Err(RagError::store(format!(
                        "Chunk {} belongs to namespace {}, not {}",
                        record.id, record.namespace, namespace
                    )));
                }

                let metadata = serde_json::to_string(&record.metadata)
                    .map_err(|e| store_error("encode metadata", e))?;
                let embedding = serde_json::to_string(&record.embedding)
                    .map_err(|e| store_error("encode embedding", e))?;

                sqlx::query(
                    r#"
                    INSERT INTO chunks (namespace, id, content, metadata, embedding)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(namespace, id) DO UPDATE SET
                        content = excluded.content,
                        metadata = excluded.metadata,
                        embedding = excluded.embedding
                    "#,
                )
                .bind(namespace.as_str())
                .bind(&record.id)
                .bind(&record.content)
                .bind(metadata)
                .bind(embedding)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("upsert chunk", e))?;
            }

            debug!(namespace = %namespace, count, "Upserted chunks into SQLite");
            Ok(count)
        }

        async fn query(
            &self,
            namespace: &Namespace,
            vector: &[f32],
            top_k: usize,
        ) -> RagResult<Vec<ScoredChunk>> {
            let rows = sqlx::query(
                "SELECT id, content, metadata, embedding FROM chunks WHERE namespace = ?",
            )
            .bind(namespace.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("query chunks", e))?;

            let mut scored = Vec::with_capacity(rows.len());
            for row in rows {
                let metadata: String = row.get("metadata");
                let embedding: String = row.get("embedding");
                let embedding: Vec<f32> = serde_json::from_str(&embedding)
                    .map_err(|e| store_error("decode embedding", e))?;

                scored.push(ScoredChunk {
                    id: row.get("id"),
                    content: row.get("content"),
                    metadata: serde_json::from_str(&metadata)
                        .map_err(|e| store_error("decode metadata", e))?,
                    score: cosine_similarity(vector, &embedding),
                });
            }

            Ok(rank(scored, top_k))
        }

        async fn count(&self, namespace: &Namespace) -> RagResult<usize> {
            let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks WHERE namespace = ?")
                .bind(namespace.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| store_error("count chunks", e))?;
            let n: i64 = row.get("n");
            Ok(n as usize)
        }

        async fn ping(&self) -> RagResult<()> {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("ping", e))?;
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "sqlite"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ns: &Namespace, id: &str, embedding: Vec<f32>) -> ChunkRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("namespace".to_string(), ns.to_string());
        ChunkRecord {
            id: id.to_string(),
            namespace: ns.clone(),
            content: format!("content of {}", id),
            metadata,
            embedding,
        }
    }

    #[test]
    fn test_rank_tie_break_by_id() {
        let chunk = |id: &str, score: f32| ScoredChunk {
            id: id.into(),
            content: String::new(),
            metadata: BTreeMap::new(),
            score,
        };
        let ranked = rank(
            vec![chunk("b", 0.5), chunk("c", 0.9), chunk("a", 0.5), chunk("d", 0.1)],
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = InMemoryVectorStore::new();
        let kb1 = Namespace::parse("kb-1").unwrap();
        let kb2 = Namespace::parse("kb-2").unwrap();

        store
            .upsert(&kb1, vec![record(&kb1, "x", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.query(&kb1, &[1.0, 0.0], 5).await.unwrap().len(), 1);
        assert!(store.query(&kb2, &[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(store.count(&kb2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::parse("default").unwrap();

        store
            .upsert(&ns, vec![record(&ns, "a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&ns, vec![record(&ns, "a", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count(&ns).await.unwrap(), 1);
        let hits = store.query(&ns, &[0.0, 1.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upsert_rejects_foreign_namespace() {
        let store = InMemoryVectorStore::new();
        let a = Namespace::parse("a").unwrap();
        let b = Namespace::parse("b").unwrap();

        let err = store
            .upsert(&a, vec![record(&b, "x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UpstreamStore { .. }));
        assert_eq!(store.count(&a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_orders_and_limits() {
        let store = InMemoryVectorStore::new();
        let ns = Namespace::parse("docs").unwrap();
        store
            .upsert(
                &ns,
                vec![
                    record(&ns, "far", vec![0.0, 1.0]),
                    record(&ns, "near", vec![1.0, 0.1]),
                    record(&ns, "exact", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query(&ns, &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
    }
}
