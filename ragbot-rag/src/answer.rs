//! Answer synthesis
//!
//! Grounded answers from retrieved context, the optional self-check pass and
//! the conversational reply used when a turn skips retrieval.

use crate::llm_client::{temperatures, GenerationParams, LanguageModel};
use crate::prompts::{
    answer_prompt, chitchat_prompt, format_context, format_history, self_check_prompt, Prompt,
};
use crate::resilience::{guarded, CallPolicy, Upstream};
use crate::types::{ChatTurn, RagError, RagResult, RetrievedChunk, StageResult, UpstreamKind};
use ragbot_core::RagbotConfig;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    policy: CallPolicy,
    params: GenerationParams,
    max_history_turns: usize,
}

impl AnswerGenerator {
    pub fn new(config: &RagbotConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            policy: CallPolicy::for_llm(config),
            params: GenerationParams {
                temperature: config.llm.temperature,
                max_tokens: Some(config.llm.max_tokens),
            },
            max_history_turns: config.chat.max_history_turns,
        }
    }

    async fn complete(&self, operation: &str, prompt: &Prompt, params: &GenerationParams) -> RagResult<String> {
        let text = guarded(&self.policy, Upstream::Model, operation, || {
            self.model.submit(prompt, params)
        })
        .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::model(
                UpstreamKind::Malformed,
                format!("{} returned an empty completion", operation),
            ));
        }
        Ok(text.to_string())
    }

    /// Answer `question` from `chunks` only. An empty chunk list still calls
    /// the model, with a prompt telling it there is no context.
    pub async fn generate(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
        tone: &str,
        style: &str,
    ) -> RagResult<String> {
        let context = format_context(chunks);
        let prompt = answer_prompt(&context, question, tone, style);
        let answer = self.complete("generate_answer", &prompt, &self.params).await?;
        debug!(sources = chunks.len(), chars = answer.len(), "Generated answer");
        Ok(answer)
    }

    /// Second pass that checks `draft` against the context. The draft is
    /// kept when there is no context or the pass fails.
    pub async fn self_check(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
        draft: String,
    ) -> StageResult<String> {
        if chunks.is_empty() {
            return StageResult::skipped(draft, "no context to check against");
        }

        let prompt = self_check_prompt(question, &format_context(chunks), &draft);
        match self.complete("self_check", &prompt, &self.params).await {
            Ok(refined) => StageResult::completed(refined),
            Err(error) => {
                warn!(error = %error, "Self-check failed, keeping the draft answer");
                StageResult::fallback(draft, &error)
            }
        }
    }

    /// Conversational reply for turns that do not need the knowledge base
    pub async fn chitchat(
        &self,
        question: &str,
        history: &[ChatTurn],
        tone: &str,
        style: &str,
    ) -> RagResult<String> {
        let history = format_history(history, self.max_history_turns);
        let prompt = chitchat_prompt(&history, question, tone, style);
        let params = GenerationParams {
            temperature: temperatures::CHITCHAT,
            max_tokens: self.params.max_tokens,
        };
        self.complete("chitchat_reply", &prompt, &params).await
    }
}
