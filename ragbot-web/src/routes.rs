//! Route definitions for the ragbot web server

use crate::{handlers, openapi, AppState};
use axum::{
    routing::{get, post},
    Router,
};

/// Create API routes, mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Chat
        .route("/chat", post(handlers::chat))
        // Ingestion
        .route("/ingest/text", post(handlers::ingest_text))
        .route("/ingest/file", post(handlers::ingest_file))
        // API description
        .route("/openapi.json", get(openapi::openapi_document))
}
