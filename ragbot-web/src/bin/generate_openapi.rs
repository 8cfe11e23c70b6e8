//! Write the OpenAPI document to disk
//!
//! Usage: `generate_openapi [OUTPUT_DIR]` (default `ragbot-web/docs`).

use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use utoipa::OpenApi;
use ragbot_web::openapi::ApiDoc;

fn main() -> anyhow::Result<()> {
    let docs_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ragbot-web/docs"));
    fs::create_dir_all(&docs_dir)
        .with_context(|| format!("Failed to create {}", docs_dir.display()))?;

    let openapi = ApiDoc::openapi();

    let json_path = docs_dir.join("openapi.json");
    fs::write(&json_path, openapi.to_pretty_json()?)?;
    println!("Generated: {}", json_path.display());

    let compact_path = docs_dir.join("openapi.compact.json");
    fs::write(&compact_path, serde_json::to_string(&openapi)?)?;
    println!("Generated: {}", compact_path.display());

    Ok(())
}
