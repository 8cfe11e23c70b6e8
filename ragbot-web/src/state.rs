//! Application state shared by all handlers

use crate::WebResult;
use ragbot_core::{RagbotConfig, StoreBackend};
use ragbot_rag::{
    ChatPipeline, Embedder, InMemoryVectorStore, Ingestor, LanguageModel, SiumaiEmbedder,
    SiumaiLanguageModel, VectorStore,
};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RagbotConfig>,
    pub pipeline: Arc<ChatPipeline>,
    pub ingestor: Arc<Ingestor>,
    pub store: Arc<dyn VectorStore>,
}

impl AppState {
    /// Build the production clients described by `config`
    pub async fn new(config: RagbotConfig) -> WebResult<Self> {
        let model: Arc<dyn LanguageModel> =
            Arc::new(SiumaiLanguageModel::new(config.llm.clone()).await?);
        let embedder: Arc<dyn Embedder> =
            Arc::new(SiumaiEmbedder::new(config.embedding.clone()).await?);
        let store = connect_store(&config).await?;

        Self::from_parts(config, model, embedder, store)
    }

    /// Assemble the state from already built collaborators
    pub fn from_parts(
        config: RagbotConfig,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> WebResult<Self> {
        let pipeline = ChatPipeline::new(&config, model, embedder.clone(), store.clone())?;
        let ingestor = Ingestor::new(&config, embedder, store.clone())?;

        info!(
            environment = %config.environment,
            model = pipeline.model_name(),
            vector_store = store.backend(),
            "Application state ready"
        );

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            ingestor: Arc::new(ingestor),
            store,
        })
    }
}

async fn connect_store(config: &RagbotConfig) -> WebResult<Arc<dyn VectorStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let store = ragbot_rag::SqliteVectorStore::connect(
                &config.store.database_url,
                config.store.timeout(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => Err(crate::WebError::Config(
            "the sqlite vector store needs the 'sqlite' feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_backend() {
        let store = connect_store(&RagbotConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_store_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagbotConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        config.store.database_url = format!("sqlite://{}", dir.path().join("chunks.db").display());

        let store = connect_store(&config).await.unwrap();
        assert_eq!(store.backend(), "sqlite");
        store.ping().await.unwrap();
    }
}
