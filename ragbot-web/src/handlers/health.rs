//! Health check handlers

use super::types::HealthResponse;
use crate::AppState;
use axum::{extract::State, response::Json};
use ragbot_core::with_timeout;
use tracing::warn;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    summary = "Health check",
    description = "Report the server version and whether the vector store is reachable",
    responses(
        (status = 200, description = "Server is up; `status` tells whether the store is reachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ping = with_timeout(state.store.ping(), state.config.store.timeout(), "store_ping").await;
    let store_ready = match ping {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(backend = state.store.backend(), error = %e, "Vector store ping failed");
            false
        }
        Err(e) => {
            warn!(backend = state.store.backend(), error = %e, "Vector store ping timed out");
            false
        }
    };

    Json(HealthResponse {
        status: if store_ready { "ok" } else { "degraded" }.to_string(),
        environment: state.config.environment.clone(),
        vector_store: if store_ready { "ready" } else { "unavailable" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}
