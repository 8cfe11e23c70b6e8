//! Chat handler

use super::types::{ChatRequestBody, ChatResponseBody, ErrorBody};
use crate::{ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use ragbot_rag::ChatRequest;
use tracing::info;

/// Answer one chat turn
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "Chat",
    summary = "Ask a question",
    description = "Classify the question, answer it from the requested namespace or reply conversationally, and suggest follow-up questions",
    request_body = ChatRequestBody,
    responses(
        (status = 200, description = "Question answered", body = ChatResponseBody),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 502, description = "Upstream service returned an unusable response", body = ErrorBody),
        (status = 503, description = "Upstream service unavailable, retry later", body = ErrorBody)
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let Json(body) = payload?;
    let request = ChatRequest::from(body);

    let response = state.pipeline.run(request).await?;
    info!(
        conversation_id = %response.conversation_id,
        intent = %response.intent,
        sources = response.sources.len(),
        "Chat turn answered"
    );

    Ok(Json(ChatResponseBody::from(response)))
}
