//! Ragbot Web Server
//!
//! Main web server implementation using Axum.

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use axum::serve;
use ragbot_core::RagbotConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct RagbotServer {
    config: WebConfig,
    state: AppState,
}

impl RagbotServer {
    pub async fn new(config: WebConfig, app_config: RagbotConfig) -> WebResult<Self> {
        let state = AppState::new(app_config).await?;
        Ok(Self { config, state })
    }

    /// Serve an already assembled state
    pub fn with_state(config: WebConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the web server; returns after Ctrl-C
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();
        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!(
            address = %address,
            environment = %self.state.config.environment,
            "Server listening"
        );

        if let Err(e) = serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!(error = %e, "Server error");
            return Err(WebError::Server(e));
        }

        info!("Server shut down");
        Ok(())
    }

    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal");
    }
}

/// Builder for [`RagbotServer`]
pub struct RagbotServerBuilder {
    config: WebConfig,
    app_config: RagbotConfig,
}

impl RagbotServerBuilder {
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
            app_config: RagbotConfig::default(),
        }
    }

    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Pipeline, store and logging settings
    pub fn app_config(mut self, app_config: RagbotConfig) -> Self {
        self.app_config = app_config;
        self
    }

    pub async fn build(self) -> WebResult<RagbotServer> {
        RagbotServer::new(self.config, self.app_config).await
    }
}

impl Default for RagbotServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
