//! Types shared by all handlers

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when the vector store answers, `degraded` otherwise
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "development")]
    pub environment: String,
    #[schema(example = "ready")]
    pub vector_store: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    UpstreamModelError,
    UpstreamStoreError,
    PipelineAbort,
    InternalError,
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorKind,
    #[schema(example = "Invalid question: must not be empty")]
    pub message: String,
    /// Whether the same request may succeed later
    pub retryable: bool,
}
