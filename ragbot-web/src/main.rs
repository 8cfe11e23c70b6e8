//! Ragbot Web Server
//!
//! HTTP front end for the retrieval-augmented chatbot.

use anyhow::Context;
use clap::Parser;
use ragbot_core::{init_logging, LogFormat, RagbotConfig};
use ragbot_web::{RagbotServerBuilder, WebConfig};
use std::path::PathBuf;
use tracing::{info, warn};

/// Ragbot Web Server - chat with your documents
#[derive(Parser)]
#[command(name = "ragbot-web")]
#[command(about = "HTTP API for the ragbot chatbot")]
#[command(version)]
struct Args {
    /// Server host to bind to (default: RAGBOT_HOST or 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on (default: RAGBOT_PORT or 8000)
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, pretty, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let mut app_config =
        RagbotConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        app_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        app_config.logging.format = format;
    }
    init_logging(&app_config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    let mut web_config = WebConfig::from_env();
    if let Some(host) = args.host {
        web_config.host = host;
    }
    if let Some(port) = args.port {
        web_config.port = port;
    }

    info!(
        address = %web_config.address(),
        environment = %app_config.environment,
        llm = %format!("{}/{}", app_config.llm.provider, app_config.llm.model),
        embedding = %app_config.embedding.model,
        store = ?app_config.store.backend,
        "Starting ragbot web server"
    );
    if app_config.llm.api_key.is_none() && app_config.llm.provider != "ollama" {
        warn!("No LLM API key configured; set OPENAI_API_KEY or llm.api_key");
    }

    let server = RagbotServerBuilder::new()
        .host(web_config.host)
        .port(web_config.port)
        .app_config(app_config)
        .build()
        .await
        .context("Failed to build server")?;

    server.start().await.context("Server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["ragbot-web"]);
        assert!(args.host.is_none());
        assert!(args.port.is_none());
        assert!(args.config.is_none());

        let args = Args::parse_from([
            "ragbot-web",
            "--host",
            "0.0.0.0",
            "--port",
            "3000",
            "--config",
            "ragbot.toml",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(3000));
        assert_eq!(args.config, Some(PathBuf::from("ragbot.toml")));
        assert_eq!(args.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_invalid_log_format_is_rejected() {
        assert!(Args::try_parse_from(["ragbot-web", "--log-format", "xml"]).is_err());
    }
}
