//! OpenAPI document for the ragbot web server

use axum::response::Json;
use utoipa::OpenApi;

use crate::handlers::{
    ChatMessage, ChatRequestBody, ChatResponseBody, ErrorBody, ErrorKind, HealthResponse,
    IngestFileForm, IngestResponse, IngestTextRequest, MessageRole, SourceDocument, StageTrace,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ragbot API",
        version = "0.1.0",
        description = "Retrieval-augmented chatbot over namespaced knowledge bases",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        crate::handlers::health_check,
        crate::handlers::chat,
        crate::handlers::ingest_text,
        crate::handlers::ingest_file,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorBody,
            ErrorKind,
            ChatMessage,
            MessageRole,
            ChatRequestBody,
            ChatResponseBody,
            SourceDocument,
            StageTrace,
            IngestTextRequest,
            IngestFileForm,
            IngestResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Chat", description = "Question answering"),
        (name = "Ingest", description = "Adding documents to a namespace"),
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document
pub async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Get the OpenAPI document as pretty-printed JSON
pub fn openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "Ragbot API");
        assert_eq!(openapi.paths.paths.len(), 4);
        assert!(openapi.paths.paths.contains_key("/api/health"));
    }

    #[test]
    fn test_openapi_json() {
        let json = openapi_json().unwrap();
        assert!(json.contains("Ragbot API"));
        assert!(json.contains("multipart/form-data"));
        assert!(json.contains("upstream_model_error"));
    }
}
