//! Chat request and response types

use ragbot_rag::{ChatRequest, ChatResponse, ChatTurn, RetrievedChunk, Role, StageRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One earlier message of the conversation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[schema(example = "What is the refund policy?")]
    pub content: String,
}

impl From<ChatMessage> for ChatTurn {
    fn from(message: ChatMessage) -> Self {
        ChatTurn {
            role: match message.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Assistant,
            },
            content: message.content,
        }
    }
}

/// Chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ChatRequestBody {
    #[schema(example = "How long do refunds take?")]
    pub question: String,
    /// Earlier turns, oldest first
    pub history: Vec<ChatMessage>,
    #[schema(example = "neutral")]
    pub tone: Option<String>,
    #[schema(example = "concise")]
    pub style: Option<String>,
    /// Number of chunks to retrieve; values above the server maximum are clamped
    #[schema(example = 5)]
    pub top_k: Option<usize>,
    #[schema(example = "default")]
    pub namespace: Option<String>,
    pub conversation_id: Option<String>,
    /// Refine the answer with a second grounded pass
    pub use_self_check: bool,
    /// Include the per-stage trace in the response
    pub debug: bool,
}

impl From<ChatRequestBody> for ChatRequest {
    fn from(body: ChatRequestBody) -> Self {
        ChatRequest {
            question: body.question,
            history: body.history.into_iter().map(ChatTurn::from).collect(),
            tone: body.tone,
            style: body.style,
            top_k: body.top_k,
            namespace: body.namespace,
            conversation_id: body.conversation_id,
            use_self_check: body.use_self_check,
            debug: body.debug,
        }
    }
}

/// A chunk the answer was grounded on
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceDocument {
    pub id: String,
    #[schema(example = "refunds.md")]
    pub title: Option<String>,
    pub snippet: String,
    pub metadata: BTreeMap<String, String>,
    #[schema(example = 0.83)]
    pub score: f32,
}

impl From<RetrievedChunk> for SourceDocument {
    fn from(chunk: RetrievedChunk) -> Self {
        Self {
            id: chunk.id,
            title: chunk.title,
            snippet: chunk.snippet,
            metadata: chunk.metadata,
            score: chunk.score,
        }
    }
}

/// Timing and outcome of one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StageTrace {
    #[schema(example = "retrieve")]
    pub stage: String,
    #[schema(example = "completed")]
    pub status: String,
    pub detail: Option<String>,
    pub retryable: bool,
    pub duration_ms: u64,
}

impl From<StageRecord> for StageTrace {
    fn from(record: StageRecord) -> Self {
        let status = match record.status {
            ragbot_rag::StageStatus::Completed => "completed",
            ragbot_rag::StageStatus::Skipped => "skipped",
            ragbot_rag::StageStatus::Degraded => "degraded",
        };
        Self {
            stage: record.stage.to_string(),
            status: status.to_string(),
            detail: record.detail,
            retryable: record.retryable,
            duration_ms: record.duration_ms,
        }
    }
}

/// Chat response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponseBody {
    pub conversation_id: String,
    pub answer: String,
    pub sources: Vec<SourceDocument>,
    pub suggested_questions: Vec<String>,
    /// `RAG_QA`, `CHITCHAT` or `OTHER`
    #[schema(example = "RAG_QA")]
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<StageTrace>>,
}

impl From<ChatResponse> for ChatResponseBody {
    fn from(response: ChatResponse) -> Self {
        Self {
            conversation_id: response.conversation_id,
            answer: response.answer,
            sources: response.sources.into_iter().map(SourceDocument::from).collect(),
            suggested_questions: response.suggested_questions,
            intent: response.intent.to_string(),
            trace: response
                .trace
                .map(|trace| trace.into_iter().map(StageTrace::from).collect()),
        }
    }
}
