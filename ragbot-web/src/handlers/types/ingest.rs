//! Ingestion request and response types

use ragbot_rag::{IngestReport, IngestRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Raw texts to add to a namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct IngestTextRequest {
    #[schema(example = json!(["The sky is blue."]))]
    pub texts: Vec<String>,
    #[schema(example = "kb-1")]
    pub namespace: Option<String>,
    /// Copied onto every stored chunk
    pub metadata: BTreeMap<String, String>,
}

impl From<IngestTextRequest> for IngestRequest {
    fn from(body: IngestTextRequest) -> Self {
        IngestRequest {
            texts: body.texts,
            namespace: body.namespace,
            metadata: body.metadata,
        }
    }
}

/// Multipart form accepted by the file upload endpoint
#[derive(Debug, ToSchema)]
pub struct IngestFileForm {
    /// A `.txt`, `.md` or `.markdown` file encoded as UTF-8
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub namespace: Option<String>,
    /// JSON object whose entries are attached to every chunk
    #[schema(example = "{\"source\": \"handbook\"}")]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub num_documents: usize,
    pub num_chunks: usize,
    #[schema(example = "kb-1")]
    pub namespace: String,
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            status: report.status,
            num_documents: report.num_documents,
            num_chunks: report.num_chunks,
            namespace: report.namespace.to_string(),
        }
    }
}
