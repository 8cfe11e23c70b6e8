//! Ragbot Web Server
//!
//! HTTP API over the chat pipeline and the ingestion path.

pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use error::ApiError;
pub use server::{RagbotServer, RagbotServerBuilder};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use ragbot_core::RagbotError;
use ragbot_rag::RagError;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Room for multipart boundaries and the small text fields next to the file
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_allow_origins);
    let body_limit = state
        .config
        .ingest
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// CORS for the configured origins. `*` allows every origin, which rules
/// out credentialed requests.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    if origins.iter().any(|origin| origin.trim() == "*") {
        if origins.len() > 1 {
            warn!("Wildcard CORS origin overrides the other configured origins");
        }
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins).allow_credentials(true)
}

/// Listener settings for the web server
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl WebConfig {
    /// Load listener settings from `RAGBOT_HOST` / `RAGBOT_PORT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("RAGBOT_HOST").unwrap_or(defaults.host),
            port: std::env::var("RAGBOT_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] RagError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] RagbotError),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    async fn allowed_origin(origins: &[&str], origin: &str) -> Option<String> {
        let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
        let app: Router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&origins));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn test_web_config_address() {
        let config = WebConfig {
            host: "0.0.0.0".to_string(),
            port: 9000,
        };
        assert_eq!(config.address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_cors_layer_skips_invalid_origins() {
        // building must not panic on a bad entry
        let _ = cors_layer(&["http://localhost:3000".to_string(), "bad\norigin".to_string()]);
    }

    #[tokio::test]
    async fn test_wildcard_origin_allows_any() {
        assert_eq!(
            allowed_origin(&["*"], "http://anywhere.test").await.as_deref(),
            Some("*")
        );
        assert_eq!(
            allowed_origin(&["http://a.test", "*"], "http://b.test").await.as_deref(),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_listed_origin_is_echoed() {
        assert_eq!(
            allowed_origin(&["http://a.test"], "http://a.test").await.as_deref(),
            Some("http://a.test")
        );
        assert_eq!(allowed_origin(&["http://a.test"], "http://b.test").await, None);
    }
}
