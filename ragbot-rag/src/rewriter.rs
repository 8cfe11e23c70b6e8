//! Follow-up question condensing

use crate::llm_client::{temperatures, GenerationParams, LanguageModel};
use crate::prompts::{condense_prompt, format_history};
use crate::resilience::{guarded, CallPolicy, Upstream};
use crate::types::{ChatTurn, StageResult};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QuestionRewriter {
    model: Arc<dyn LanguageModel>,
    policy: CallPolicy,
    max_history_turns: usize,
}

impl QuestionRewriter {
    pub fn new(model: Arc<dyn LanguageModel>, policy: CallPolicy, max_history_turns: usize) -> Self {
        Self {
            model,
            policy,
            max_history_turns,
        }
    }

    /// Rewrite `question` so it stands on its own. Without history the
    /// question is returned unchanged and the model is not called; on any
    /// failure the original question is used.
    pub async fn rewrite(&self, history: &[ChatTurn], question: &str) -> StageResult<String> {
        if history.is_empty() {
            return StageResult::skipped(question.to_string(), "no history");
        }

        let prompt = condense_prompt(&format_history(history, self.max_history_turns), question);
        let params = GenerationParams::with_temperature(temperatures::REWRITE);

        let rewritten = guarded(&self.policy, Upstream::Model, "rewrite_question", || {
            self.model.submit(&prompt, &params)
        })
        .await;

        match rewritten {
            Ok(text) if !text.trim().is_empty() => {
                let standalone = text.trim().to_string();
                debug!(original = %question, standalone = %standalone, "Rewrote question");
                StageResult::completed(standalone)
            }
            Ok(_) => {
                warn!("Rewriter returned an empty question, using the original");
                StageResult::degraded(question.to_string(), "empty rewrite", false)
            }
            Err(error) => {
                warn!(error = %error, "Question rewrite failed, using the original");
                StageResult::fallback(question.to_string(), &error)
            }
        }
    }
}
