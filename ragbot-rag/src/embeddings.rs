//! Embedding generation
//!
//! [`Embedder`] turns text into fixed-length vectors. [`SiumaiEmbedder`] calls
//! the provider's embedding endpoint.

use crate::llm_client::classify_provider_error;
use crate::types::{RagError, RagResult, UpstreamKind};
use async_trait::async_trait;
use ragbot_core::EmbeddingConfig;
use siumai::prelude::*;
use tracing::{debug, info};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::model(UpstreamKind::Malformed, "Empty embedding response"))
    }

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>>;
}

/// Reject responses whose shape does not match the request
pub fn check_vectors(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: Option<usize>,
) -> RagResult<()> {
    if vectors.len() != expected_count {
        return Err(RagError::model(
            UpstreamKind::Malformed,
            format!(
                "Expected {} embeddings, got {}",
                expected_count,
                vectors.len()
            ),
        ));
    }

    if let Some(dimension) = dimension {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::model(
                UpstreamKind::Malformed,
                format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    dimension,
                    bad.len()
                ),
            ));
        }
    }

    Ok(())
}

pub struct SiumaiEmbedder {
    config: EmbeddingConfig,
    client: Box<dyn LlmClient>,
}

impl SiumaiEmbedder {
    pub async fn new(config: EmbeddingConfig) -> RagResult<Self> {
        let client: Box<dyn LlmClient> = match config.provider.as_str() {
            "openai" => {
                let api_key = config
                    .api_key
                    .clone()
                    .ok_or_else(|| RagError::Config("OpenAI API key not found".to_string()))?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model);

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder.build().await.map_err(|e| {
                    RagError::Config(format!("Failed to create OpenAI embedding client: {}", e))
                })?;
                Box::new(client)
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let client = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .build()
                    .await
                    .map_err(|e| {
                        RagError::Config(format!("Failed to create Ollama embedding client: {}", e))
                    })?;
                Box::new(client)
            }
            provider => {
                return Err(RagError::Config(format!(
                    "Unsupported embedding provider: {}",
                    provider
                )));
            }
        };

        if client.as_embedding_capability().is_none() {
            return Err(RagError::Config(format!(
                "Provider {} does not support embeddings",
                config.provider
            )));
        }

        info!(
            provider = %config.provider,
            model = %config.model,
            dimension = ?config.dimension,
            batch_size = config.batch_size,
            "Initialized embedding client"
        );

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Embedder for SiumaiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedding_client = self.client.as_embedding_capability().ok_or_else(|| {
            RagError::Config(format!(
                "Provider {} does not support embeddings",
                self.config.provider
            ))
        })?;

        let start_time = std::time::Instant::now();
        let response = embedding_client
            .embed(texts.to_vec())
            .await
            .map_err(|e| {
                let message = format!("Embedding generation failed: {}", e);
                RagError::model(classify_provider_error(&message), message)
            })?;

        check_vectors(&response.embeddings, texts.len(), self.config.dimension)?;

        debug!(
            count = texts.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Generated embeddings"
        );

        Ok(response.embeddings)
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
