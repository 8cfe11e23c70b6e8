//! Language model access
//!
//! [`LanguageModel`] is the narrow seam the pipeline talks to. The production
//! implementation wraps a siumai client per sampling temperature.

use crate::prompts::Prompt;
use crate::types::{RagError, RagResult, UpstreamKind};
use async_trait::async_trait;
use ragbot_core::LlmConfig;
use siumai::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Sampling parameters for one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }
}

/// Fixed temperatures of the auxiliary stages
pub mod temperatures {
    pub const CLASSIFY: f32 = 0.0;
    pub const REWRITE: f32 = 0.0;
    pub const SUGGEST: f32 = 0.5;
    pub const CHITCHAT: f32 = 0.7;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one prompt and return the completion text
    async fn submit(&self, prompt: &Prompt, params: &GenerationParams) -> RagResult<String>;

    /// Short human-readable description, e.g. `openai/gpt-4.1-mini`
    fn describe(&self) -> String;
}

/// Map a provider error message onto the upstream error kinds
pub fn classify_provider_error(message: &str) -> UpstreamKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("quota") {
        UpstreamKind::RateLimited
    } else if lower.contains("timeout") || lower.contains("timed out") {
        UpstreamKind::Timeout
    } else if lower.contains("parse") || lower.contains("deserializ") || lower.contains("invalid json")
    {
        UpstreamKind::Malformed
    } else {
        UpstreamKind::Unavailable
    }
}

fn build_failed(provider: &str, e: impl std::fmt::Display) -> RagError {
    RagError::Config(format!("Failed to build {} client: {}", provider, e))
}

/// siumai-backed model; clients are built lazily, one per sampling setup
pub struct SiumaiLanguageModel {
    config: LlmConfig,
    clients: Mutex<HashMap<(u32, Option<u32>), Arc<dyn LlmClient>>>,
}

impl SiumaiLanguageModel {
    /// Create the model and eagerly build the client for the configured temperature,
    /// so that bad credentials or providers fail at startup.
    pub async fn new(config: LlmConfig) -> RagResult<Self> {
        let model = Self {
            config,
            clients: Mutex::new(HashMap::new()),
        };
        model.client_for(model.config.temperature, None).await?;

        info!(
            provider = %model.config.provider,
            model = %model.config.model,
            "Created language model client"
        );

        Ok(model)
    }

    async fn client_for(
        &self,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> RagResult<Arc<dyn LlmClient>> {
        let key = (temperature.to_bits(), max_tokens);
        if let Some(client) = self.clients.lock().await.get(&key) {
            return Ok(Arc::clone(client));
        }

        // built without the lock held; a concurrent build of the same key keeps the first
        let built: Arc<dyn LlmClient> =
            Arc::from(Self::build_client(&self.config, temperature, max_tokens).await?);
        let mut clients = self.clients.lock().await;
        Ok(Arc::clone(clients.entry(key).or_insert(built)))
    }

    /// Build the appropriate siumai client based on configuration
    async fn build_client(
        config: &LlmConfig,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> RagResult<Box<dyn LlmClient>> {
        let max_tokens = max_tokens.unwrap_or(config.max_tokens);

        match config.provider.as_str() {
            "openai" => {
                let api_key = config
                    .api_key
                    .clone()
                    .ok_or_else(|| RagError::Config("OpenAI API key not found".to_string()))?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(temperature)
                    .max_tokens(max_tokens);

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_failed("OpenAI", e))?;
                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                    .ok_or_else(|| RagError::Config("Anthropic API key not found".to_string()))?;

                let client = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(temperature)
                    .max_tokens(max_tokens)
                    .build()
                    .await
                    .map_err(|e| build_failed("Anthropic", e))?;
                Ok(Box::new(client))
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
                    .temperature(temperature)
                    .max_tokens(max_tokens)
                    .build()
                    .await
                    .map_err(|e| build_failed("Ollama", e))?;
                Ok(Box::new(client))
            }
            "groq" => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("GROQ_API_KEY").ok())
                    .ok_or_else(|| RagError::Config("Groq API key not found".to_string()))?;

                let client = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(temperature)
                    .max_tokens(max_tokens)
                    .build()
                    .await
                    .map_err(|e| build_failed("Groq", e))?;
                Ok(Box::new(client))
            }
            provider => Err(RagError::Config(format!(
                "Unsupported LLM provider: {}",
                provider
            ))),
        }
    }
}

#[async_trait]
impl LanguageModel for SiumaiLanguageModel {
    async fn submit(&self, prompt: &Prompt, params: &GenerationParams) -> RagResult<String> {
        let client = self.client_for(params.temperature, params.max_tokens).await?;
        let start_time = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &prompt.system {
            messages.push(system!(system_prompt.as_str()));
        }
        messages.push(user!(prompt.user.as_str()));

        debug!(
            task = %prompt.task,
            prompt_chars = prompt.user.len(),
            temperature = params.temperature,
            "Submitting prompt"
        );

        let response = client.chat(messages).await.map_err(|e| {
            let message = e.to_string();
            RagError::model(classify_provider_error(&message), message)
        })?;

        let content = response
            .content_text()
            .map(|text| text.to_string())
            .ok_or_else(|| {
                RagError::model(UpstreamKind::Malformed, "No text content in LLM response")
            })?;

        debug!(
            task = %prompt.task,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            response_chars = content.len(),
            "Received completion"
        );

        Ok(content)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.config.provider, self.config.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_provider_error() {
        assert_eq!(
            classify_provider_error("HTTP 429 Too Many Requests"),
            UpstreamKind::RateLimited
        );
        assert_eq!(
            classify_provider_error("request timed out"),
            UpstreamKind::Timeout
        );
        assert_eq!(
            classify_provider_error("failed to parse response body"),
            UpstreamKind::Malformed
        );
        assert_eq!(
            classify_provider_error("connection refused"),
            UpstreamKind::Unavailable
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        let result = SiumaiLanguageModel::new(config).await;
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        let result = SiumaiLanguageModel::new(config).await;
        assert!(matches!(result, Err(RagError::Config(msg)) if msg.contains("carrier-pigeon")));
    }

    #[tokio::test]
    async fn test_clients_cached_per_sampling_setup() {
        // building an ollama client does not contact the server
        let config = LlmConfig {
            provider: "ollama".into(),
            base_url: Some("http://127.0.0.1:9".into()),
            ..LlmConfig::default()
        };
        let model = SiumaiLanguageModel::new(config).await.unwrap();

        let (a, b) = tokio::join!(model.client_for(0.0, None), model.client_for(0.0, None));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));

        let c = model.client_for(0.5, None).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        // the configured temperature, 0.0 and 0.5
        assert_eq!(model.clients.lock().await.len(), 3);
    }
}
