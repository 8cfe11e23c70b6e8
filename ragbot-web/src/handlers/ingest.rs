//! Ingestion handlers

use super::types::{ErrorBody, IngestFileForm, IngestResponse, IngestTextRequest};
use crate::{ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    response::Json,
};
use ragbot_rag::IngestRequest;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Ingest raw texts
#[utoipa::path(
    post,
    path = "/api/ingest/text",
    tag = "Ingest",
    summary = "Ingest texts",
    description = "Split, embed and store texts under a namespace",
    request_body = IngestTextRequest,
    responses(
        (status = 200, description = "Texts stored", body = IngestResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 503, description = "Embedding service or vector store unavailable", body = ErrorBody)
    )
)]
pub async fn ingest_text(
    State(state): State<AppState>,
    payload: Result<Json<IngestTextRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(body) = payload?;
    let report = state.ingestor.ingest(IngestRequest::from(body)).await?;
    Ok(Json(IngestResponse::from(report)))
}

/// Upload a text or markdown file
#[utoipa::path(
    post,
    path = "/api/ingest/file",
    tag = "Ingest",
    summary = "Ingest a file",
    description = "Store the content of an uploaded .txt, .md or .markdown file; the file name is kept as `filename` metadata",
    request_body(content = IngestFileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = IngestResponse),
        (status = 400, description = "Missing file, bad metadata or content that is not UTF-8", body = ErrorBody),
        (status = 413, description = "File too large", body = ErrorBody),
        (status = 415, description = "Unsupported file type", body = ErrorBody),
        (status = 503, description = "Embedding service or vector store unavailable", body = ErrorBody)
    )
)]
pub async fn ingest_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut namespace = None;
    let mut metadata = BTreeMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                upload = Some((filename, bytes.to_vec()));
            }
            "namespace" => {
                namespace = Some(field.text().await?);
            }
            "metadata" => {
                metadata = parse_metadata(&field.text().await?)?;
            }
            other => debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::validation("Missing 'file' field in form data"))?;
    check_extension(&filename, &state.config.ingest.allowed_extensions)?;

    let limit = state.config.ingest.max_upload_bytes;
    if bytes.len() > limit {
        return Err(ApiError::payload_too_large(format!(
            "File is {} bytes, the limit is {} bytes",
            bytes.len(),
            limit
        )));
    }

    let text = String::from_utf8(bytes)
        .map_err(|_| ApiError::validation(format!("File '{}' is not valid UTF-8", filename)))?;

    info!(filename = %filename, bytes = text.len(), "Ingesting uploaded file");
    metadata.insert("filename".to_string(), filename);

    let report = state
        .ingestor
        .ingest(IngestRequest {
            texts: vec![text],
            namespace,
            metadata,
        })
        .await?;

    Ok(Json(IngestResponse::from(report)))
}

fn check_extension(filename: &str, allowed: &[String]) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(())
    } else {
        Err(ApiError::unsupported_media_type(format!(
            "Unsupported file type '{}'; allowed: {}",
            filename,
            allowed.join(", ")
        )))
    }
}

/// Metadata arrives as a JSON object; non-string values are kept in their JSON form
fn parse_metadata(raw: &str) -> Result<BTreeMap<String, String>, ApiError> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| ApiError::validation(format!("metadata must be a JSON object: {}", e)))?;

    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
