//! Mapping of pipeline errors onto HTTP responses

use crate::handlers::types::{ErrorBody, ErrorKind};
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ragbot_rag::RagError;
use tracing::{error, warn};

/// An error as sent to API clients: a status code and an [`ErrorBody`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: kind,
                message: message.into(),
                retryable,
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::ValidationError, message, false)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::ValidationError,
            message,
            false,
        )
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::ValidationError,
            message,
            false,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InternalError,
            message,
            false,
        )
    }

    /// Rejections from body extractors keep their size and media type status
    fn rejected(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::PAYLOAD_TOO_LARGE => Self::payload_too_large(message),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => Self::unsupported_media_type(message),
            _ => Self::validation(message),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> ErrorKind {
        self.body.error
    }

    pub fn retryable(&self) -> bool {
        self.body.retryable
    }
}

/// Status for the innermost error of a failed turn
fn status_for(error: &RagError) -> StatusCode {
    match error {
        RagError::Validation { .. } => StatusCode::BAD_REQUEST,
        RagError::UpstreamModel { .. } | RagError::UpstreamStore { .. } => {
            if error.is_retryable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_GATEWAY
            }
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let kind = match &err {
            RagError::Validation { .. } => ErrorKind::ValidationError,
            RagError::UpstreamModel { .. } => ErrorKind::UpstreamModelError,
            RagError::UpstreamStore { .. } => ErrorKind::UpstreamStoreError,
            RagError::PipelineAbort { .. } => ErrorKind::PipelineAbort,
            RagError::Config(_) | RagError::Core(_) => ErrorKind::InternalError,
        };
        let status = status_for(err.root());

        if kind == ErrorKind::InternalError {
            match &err {
                RagError::Core(core) => core.log(),
                other => error!(error = %other, "Internal error while handling request"),
            }
            return Self::internal("Internal server error");
        }

        Self::new(status, kind, err.to_string(), err.is_retryable())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::rejected(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(
                status = self.status.as_u16(),
                kind = ?self.body.error,
                message = %self.body.message,
                "Request failed"
            );
        }
        (self.status, Json(self.body)).into_response()
    }
}
