//! Integration test helpers
//!
//! Spawns the full router on a random port with scripted collaborators and
//! talks to it over HTTP.

#![allow(dead_code)]

use ragbot_core::RagbotConfig;
use ragbot_rag::testing::{HashEmbedder, ScriptedModel};
use ragbot_rag::{InMemoryVectorStore, VectorStore};
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};
use tokio::net::TcpListener;

// Make sure tracing is only initialised once
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub model: Arc<ScriptedModel>,
    pub embedder: Arc<HashEmbedder>,
}

impl TestApp {
    pub async fn get_health(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/api/health", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_chat(&self, body: &Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/chat", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_ingest_text(&self, body: &Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/ingest/text", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_ingest_file(&self, form: reqwest::multipart::Form) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/ingest/file", &self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Ingest `texts` into `namespace` and assert it worked
    pub async fn ingest(&self, texts: &[&str], namespace: &str) -> Value {
        let response = self
            .post_ingest_text(&json!({ "texts": texts, "namespace": namespace }))
            .await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Failed to parse ingest response")
    }
}

pub fn test_config() -> RagbotConfig {
    let mut config = RagbotConfig::default();
    config.retry.max_attempts = 1;
    config
}

/// Start an app with the happy scripted model and an in-memory store
pub async fn spawn_app() -> TestApp {
    spawn_app_with(
        test_config(),
        ScriptedModel::happy(),
        Arc::new(InMemoryVectorStore::new()),
    )
    .await
}

pub async fn spawn_app_with(
    config: RagbotConfig,
    model: ScriptedModel,
    store: Arc<dyn VectorStore>,
) -> TestApp {
    LazyLock::force(&TRACING);

    let model = Arc::new(model);
    let embedder = Arc::new(HashEmbedder::new());
    let state = ragbot_web::AppState::from_parts(config, model.clone(), embedder.clone(), store)
        .expect("Failed to build application state");
    let app = ragbot_web::create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        api_client: reqwest::Client::new(),
        model,
        embedder,
    }
}
