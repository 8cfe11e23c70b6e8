//! Type definitions for the chat pipeline
//!
//! Requests, responses, stored chunks, the stage trace and the error taxonomy.

use ragbot_core::{is_valid_namespace, RagbotError, Recoverable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who produced a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single prior message. History is ordered oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    #[serde(rename = "RAG_QA")]
    RagQa,
    #[serde(rename = "CHITCHAT")]
    Chitchat,
    #[serde(rename = "OTHER")]
    Other,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::RagQa => "RAG_QA",
            Intent::Chitchat => "CHITCHAT",
            Intent::Other => "OTHER",
        }
    }

    /// Whether the turn goes through retrieval
    pub fn needs_retrieval(&self) -> bool {
        matches!(self, Intent::RagQa)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical partition of the vector store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn parse(value: &str) -> RagResult<Self> {
        let trimmed = value.trim();
        if is_valid_namespace(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(RagError::validation(
                "namespace",
                format!(
                    "'{}' is not a valid namespace (1-64 chars of [A-Za-z0-9_.-])",
                    value
                ),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The requested namespace, or `default` when none was given
    pub fn resolve(requested: Option<&str>, default: &Namespace) -> RagResult<Self> {
        match requested.map(str::trim) {
            Some(value) if !value.is_empty() => Namespace::parse(value),
            _ => Ok(default.clone()),
        }
    }
}

impl TryFrom<String> for Namespace {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Namespace::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat turn as submitted by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub question: String,
    pub history: Vec<ChatTurn>,
    pub tone: Option<String>,
    pub style: Option<String>,
    pub top_k: Option<usize>,
    pub namespace: Option<String>,
    pub conversation_id: Option<String>,
    /// Run the self-check refinement after answering
    pub use_self_check: bool,
    /// Attach the stage trace to the response
    pub debug: bool,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Chunk as persisted in a vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub namespace: Namespace,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

/// A stored chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

/// A chunk selected for one turn, in relevance order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub title: Option<String>,
    /// First 300 characters of the chunk, trimmed
    pub snippet: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
    /// Full text, used for prompting and never sent to clients
    #[serde(skip)]
    pub content: String,
}

pub const SNIPPET_CHARS: usize = 300;

impl From<ScoredChunk> for RetrievedChunk {
    fn from(chunk: ScoredChunk) -> Self {
        let title = chunk
            .metadata
            .get("title")
            .or_else(|| chunk.metadata.get("filename"))
            .cloned();
        let snippet = chunk
            .content
            .chars()
            .take(SNIPPET_CHARS)
            .collect::<String>()
            .trim()
            .to_string();

        Self {
            id: chunk.id,
            title,
            snippet,
            metadata: chunk.metadata,
            score: chunk.score,
            content: chunk.content,
        }
    }
}

/// Pipeline stages, as named in traces and abort errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Classify,
    Rewrite,
    Retrieve,
    Answer,
    SelfCheck,
    Suggest,
    Chitchat,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Classify => "classify",
            Stage::Rewrite => "rewrite",
            Stage::Retrieve => "retrieve",
            Stage::Answer => "answer",
            Stage::SelfCheck => "self_check",
            Stage::Suggest => "suggest",
            Stage::Chitchat => "chitchat",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Skipped,
    /// Failed and fell back to the stage's default
    Degraded,
}

/// Trace entry for one stage of one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Set on degraded stages whose failure may go away on retry
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    pub duration_ms: u64,
}

/// Value produced by a stage that may degrade instead of failing
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult<T> {
    pub value: T,
    pub status: StageStatus,
    pub detail: Option<String>,
    pub retryable: bool,
}

impl<T> StageResult<T> {
    pub fn completed(value: T) -> Self {
        Self {
            value,
            status: StageStatus::Completed,
            detail: None,
            retryable: false,
        }
    }

    pub fn skipped(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            status: StageStatus::Skipped,
            detail: Some(reason.into()),
            retryable: false,
        }
    }

    pub fn degraded(value: T, reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            value,
            status: StageStatus::Degraded,
            detail: Some(reason.into()),
            retryable,
        }
    }

    /// Fallback after `error`, keeping its retryability
    pub fn fallback(value: T, error: &RagError) -> Self {
        Self::degraded(value, error.to_string(), error.is_retryable())
    }

    pub fn record(&self, stage: Stage, duration_ms: u64) -> StageRecord {
        StageRecord {
            stage,
            status: self.status,
            detail: self.detail.clone(),
            retryable: self.retryable,
            duration_ms,
        }
    }
}

/// Result of running the stages, before it becomes a [`ChatResponse`]
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// CHITCHAT or OTHER: answered without retrieval
    ShortCircuited { intent: Intent, answer: String },
    FullyProcessed {
        intent: Intent,
        standalone_question: String,
        sources: Vec<RetrievedChunk>,
        answer: String,
        suggestions: Vec<String>,
    },
}

impl PipelineOutcome {
    pub fn intent(&self) -> Intent {
        match self {
            PipelineOutcome::ShortCircuited { intent, .. } => *intent,
            PipelineOutcome::FullyProcessed { intent, .. } => *intent,
        }
    }

    pub fn into_response(
        self,
        conversation_id: String,
        trace: Option<Vec<StageRecord>>,
    ) -> ChatResponse {
        match self {
            PipelineOutcome::ShortCircuited { intent, answer } => ChatResponse {
                conversation_id,
                answer,
                sources: Vec::new(),
                suggested_questions: Vec::new(),
                intent,
                trace,
            },
            PipelineOutcome::FullyProcessed {
                intent,
                sources,
                answer,
                suggestions,
                ..
            } => ChatResponse {
                conversation_id,
                answer,
                sources,
                suggested_questions: suggestions,
                intent,
                trace,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub suggested_questions: Vec<String>,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<StageRecord>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestRequest {
    pub texts: Vec<String>,
    pub namespace: Option<String>,
    /// Copied onto every chunk produced by this request
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: String,
    pub num_documents: usize,
    pub num_chunks: usize,
    pub namespace: Namespace,
}

/// Why a call to the language model or embedding service failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamKind {
    RateLimited,
    Timeout,
    Unavailable,
    /// The service answered but the payload was unusable
    Malformed,
}

impl fmt::Display for UpstreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpstreamKind::RateLimited => "rate limited",
            UpstreamKind::Timeout => "timeout",
            UpstreamKind::Unavailable => "unavailable",
            UpstreamKind::Malformed => "malformed response",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RagError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Language model {kind}: {message}")]
    UpstreamModel { kind: UpstreamKind, message: String },

    #[error("Vector store error: {message}")]
    UpstreamStore { message: String },

    #[error("Pipeline aborted at {stage}: {source}")]
    PipelineAbort {
        stage: Stage,
        #[source]
        source: Box<RagError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(Box<RagbotError>),
}

pub type RagResult<T> = Result<T, RagError>;

impl RagError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn model(kind: UpstreamKind, message: impl Into<String>) -> Self {
        RagError::UpstreamModel {
            kind,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        RagError::UpstreamStore {
            message: message.into(),
        }
    }

    pub fn abort(stage: Stage, source: RagError) -> Self {
        match source {
            // validation happens before any stage and is never wrapped
            RagError::Validation { .. } | RagError::PipelineAbort { .. } => source,
            other => RagError::PipelineAbort {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Whether the caller should be told to try again
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::UpstreamModel { kind, .. } => !matches!(kind, UpstreamKind::Malformed),
            RagError::UpstreamStore { .. } => true,
            RagError::PipelineAbort { source, .. } => source.is_retryable(),
            RagError::Core(e) => e.is_recoverable(),
            RagError::Validation { .. } | RagError::Config(_) => false,
        }
    }

    /// The innermost error, looking through pipeline aborts
    pub fn root(&self) -> &RagError {
        match self {
            RagError::PipelineAbort { source, .. } => source.root(),
            other => other,
        }
    }
}

impl Recoverable for RagError {
    fn is_recoverable(&self) -> bool {
        self.is_retryable()
    }
}

impl From<RagbotError> for RagError {
    fn from(err: RagbotError) -> Self {
        RagError::Core(Box::new(err))
    }
}
