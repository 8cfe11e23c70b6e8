//! Configuration management
//!
//! One [`RagbotConfig`] is built at startup (defaults, then an optional TOML
//! file, then environment overrides) and handed to every component.

use crate::async_utils::RetryConfig;
use crate::error::{ErrorContext, RagbotError, RagbotResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum length of a namespace identifier
pub const MAX_NAMESPACE_LEN: usize = 64;

/// Namespaces are 1-64 chars of ASCII letters, digits, `-`, `_` or `.`
pub fn is_valid_namespace(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_NAMESPACE_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagbotConfig {
    /// Free-form deployment label reported by the health endpoint
    pub environment: String,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkingConfig,
    pub chat: ChatConfig,
    pub suggestions: SuggestionConfig,
    pub ingest: IngestConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// openai, anthropic, ollama or groq
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Temperature of the answer stage; other stages use fixed values
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Expected vector length; vectors of any other length are rejected
    pub dimension: Option<usize>,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Only used by the sqlite backend
    pub database_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub default_namespace: String,
    pub similarity_threshold: Option<f32>,
    /// Upper bound on the summed length of retrieved chunk text
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_question_chars: usize,
    pub max_history_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub enabled: bool,
    pub max_suggestions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_upload_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub cors_allow_origins: Vec<String>,
}

impl Default for RagbotConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            chat: ChatConfig::default(),
            suggestions: SuggestionConfig::default(),
            ingest: IngestConfig::default(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.2,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-large".to_string(),
            api_key: None,
            base_url: None,
            dimension: None,
            batch_size: 100,
            max_concurrency: 4,
            timeout_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: "sqlite://ragbot.db".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
            default_namespace: "default".to_string(),
            similarity_threshold: None,
            max_context_chars: 12000,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_question_chars: 4000,
            max_history_turns: 20,
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_suggestions: 5,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
            allowed_extensions: vec!["txt".to_string(), "md".to_string(), "markdown".to_string()],
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_allow_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8000".to_string(),
                "http://localhost:8501".to_string(),
            ],
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn config_failure(message: String, operation: &str, suggestion: &str) -> RagbotError {
    RagbotError::Config {
        message,
        source: None,
        context: ErrorContext::new("config")
            .with_operation(operation)
            .with_suggestion(suggestion),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> RagbotResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        config_failure(
            format!("Invalid value for {}: {} ({})", key, raw, e),
            "apply_env_overrides",
            "Fix or unset the environment variable",
        )
    })
}

impl RagbotConfig {
    /// Defaults, then the optional TOML file, then the process environment
    pub fn load(path: Option<&Path>) -> RagbotResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> RagbotResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagbotError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        toml::from_str(&content).map_err(|e| RagbotError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RagbotResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| RagbotError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| RagbotError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })
    }

    /// Override fields from environment variables.
    ///
    /// `lookup` is usually `std::env::var(..).ok()`; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> RagbotResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(v.clone());
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.llm.base_url = Some(v.clone());
            self.embedding.base_url = Some(v);
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.to_lowercase();
        }
        if let Some(v) = get("CHAT_MODEL_NAME") {
            self.llm.model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL_NAME") {
            self.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION") {
            self.embedding.dimension = Some(parse_env("EMBEDDING_DIMENSION", &v)?);
        }
        if let Some(v) = get("DEFAULT_TEMPERATURE") {
            self.llm.temperature = parse_env("DEFAULT_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("VECTOR_STORE") {
            self.store.backend = match v.trim().to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sqlite" => StoreBackend::Sqlite,
                other => {
                    return Err(config_failure(
                        format!("Unknown vector store backend '{}'", other),
                        "apply_env_overrides",
                        "Use 'memory' or 'sqlite'",
                    ))
                }
            };
        }
        if let Some(v) = get("DATABASE_URL") {
            self.store.database_url = v;
        }
        if let Some(v) = get("DEFAULT_TOP_K") {
            self.retrieval.default_top_k = parse_env("DEFAULT_TOP_K", &v)?;
        }
        if let Some(v) = get("MAX_TOP_K") {
            self.retrieval.max_top_k = parse_env("MAX_TOP_K", &v)?;
        }
        if let Some(v) = get("DEFAULT_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("DEFAULT_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("DEFAULT_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("DEFAULT_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("MAX_UPLOAD_MB") {
            let mb: usize = parse_env("MAX_UPLOAD_MB", &v)?;
            self.ingest.max_upload_bytes = mb.checked_mul(1024 * 1024).ok_or_else(|| {
                config_failure(
                    format!("MAX_UPLOAD_MB is too large: {}", mb),
                    "apply_env_overrides",
                    "Use a smaller upload limit",
                )
            })?;
        }
        if let Some(v) = get("CORS_ALLOW_ORIGINS") {
            self.server.cors_allow_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    pub fn validate(&self) -> RagbotResult<()> {
        if self.chunking.chunk_size == 0 {
            return Err(config_failure(
                "chunk_size must be greater than 0".to_string(),
                "validate",
                "Set chunking.chunk_size to a positive value",
            ));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(config_failure(
                format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    self.chunking.chunk_overlap, self.chunking.chunk_size
                ),
                "validate",
                "Lower chunking.chunk_overlap",
            ));
        }

        if self.retrieval.max_top_k == 0
            || self.retrieval.default_top_k == 0
            || self.retrieval.default_top_k > self.retrieval.max_top_k
        {
            return Err(config_failure(
                format!(
                    "default_top_k ({}) must be within 1..={}",
                    self.retrieval.default_top_k, self.retrieval.max_top_k
                ),
                "validate",
                "Adjust retrieval.default_top_k and retrieval.max_top_k",
            ));
        }

        if !is_valid_namespace(&self.retrieval.default_namespace) {
            return Err(config_failure(
                format!(
                    "Invalid default namespace '{}'",
                    self.retrieval.default_namespace
                ),
                "validate",
                "Use 1-64 characters from [A-Za-z0-9_.-]",
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(config_failure(
                "llm.max_tokens must be greater than 0".to_string(),
                "validate",
                "Set llm.max_tokens to a positive value",
            ));
        }

        if self.embedding.batch_size == 0 || self.embedding.max_concurrency == 0 {
            return Err(config_failure(
                "embedding.batch_size and embedding.max_concurrency must be positive".to_string(),
                "validate",
                "Set both values to at least 1",
            ));
        }

        if self.suggestions.max_suggestions == 0 && self.suggestions.enabled {
            return Err(config_failure(
                "suggestions.max_suggestions must be positive when suggestions are enabled"
                    .to_string(),
                "validate",
                "Disable suggestions or raise the limit",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(config_failure(
                "retry.max_attempts must be at least 1".to_string(),
                "validate",
                "Set retry.max_attempts to 1 to disable retries",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_namespace_rules() {
        assert!(is_valid_namespace("kb-1"));
        assert!(is_valid_namespace("team_docs.v2"));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("has space"));
        assert!(!is_valid_namespace(&"x".repeat(65)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("DEFAULT_TOP_K", "3"),
            ("MAX_UPLOAD_MB", "2"),
            ("VECTOR_STORE", "SQLite"),
            ("CORS_ALLOW_ORIGINS", "http://a.test, http://b.test,"),
            ("CHAT_MODEL_NAME", ""),
        ]
        .into_iter()
        .collect();

        let mut config = RagbotConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.retrieval.default_top_k, 3);
        assert_eq!(config.ingest.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(
            config.server.cors_allow_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        // blank values are ignored
        assert_eq!(config.llm.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = RagbotConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "MAX_TOP_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, RagbotError::Config { .. }));
    }

    #[test]
    fn test_oversized_upload_limit_is_config_error() {
        let huge = usize::MAX.to_string();
        let mut config = RagbotConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "MAX_UPLOAD_MB").then(|| huge.clone()))
            .unwrap_err();
        assert!(matches!(err, RagbotError::Config { .. }));
        assert!(err.to_string().contains("MAX_UPLOAD_MB"));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut config = RagbotConfig::default();
        config.validate().unwrap();

        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());

        let mut config = RagbotConfig::default();
        config.retrieval.default_top_k = 50;
        assert!(config.validate().is_err());
    }
}
