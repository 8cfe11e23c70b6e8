//! Intent classification
//!
//! Decides whether a turn needs the knowledge base. Failures never abort the
//! turn: the classifier falls back to [`Intent::RagQa`].

use crate::llm_client::{temperatures, GenerationParams, LanguageModel};
use crate::prompts::intent_prompt;
use crate::resilience::{guarded, CallPolicy, Upstream};
use crate::types::{ChatTurn, Intent, RagError, StageResult, UpstreamKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Map raw model output onto an intent, `None` when nothing matches
pub fn normalize_intent(raw: &str) -> Option<Intent> {
    let text = raw.trim().to_uppercase();
    if text.contains("RAG") {
        Some(Intent::RagQa)
    } else if text.contains("CHITCHAT") || text.contains("CHAT") || text.contains("SMALLTALK") {
        Some(Intent::Chitchat)
    } else if text.contains("OTHER") {
        Some(Intent::Other)
    } else {
        None
    }
}

pub struct IntentClassifier {
    model: Arc<dyn LanguageModel>,
    policy: CallPolicy,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, policy: CallPolicy) -> Self {
        Self { model, policy }
    }

    /// Classify the question. History is accepted for future use; the
    /// prompt only looks at the latest message.
    pub async fn classify(&self, question: &str, _history: &[ChatTurn]) -> StageResult<Intent> {
        let prompt = intent_prompt(question);
        let params = GenerationParams::with_temperature(temperatures::CLASSIFY);

        let raw = guarded(&self.policy, Upstream::Model, "classify_intent", || {
            self.model.submit(&prompt, &params)
        })
        .await;

        match raw {
            Ok(raw) => match normalize_intent(&raw) {
                Some(intent) => {
                    debug!(intent = %intent, "Classified intent");
                    StageResult::completed(intent)
                }
                None => {
                    warn!(raw = %raw.trim(), "Unrecognised intent label, defaulting to RAG_QA");
                    let error = RagError::model(
                        UpstreamKind::Malformed,
                        format!("unrecognised intent label '{}'", raw.trim()),
                    );
                    StageResult::degraded(Intent::RagQa, error.to_string(), true)
                }
            },
            Err(error) => {
                warn!(error = %error, "Intent classification failed, defaulting to RAG_QA");
                StageResult::degraded(Intent::RagQa, error.to_string(), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use crate::types::{RagResult, Stage, StageStatus};
    use ragbot_core::RetryConfig;
    use std::time::Duration;

    fn classifier(reply: &'static str) -> (IntentClassifier, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel::new(move |_| Ok(reply.to_string())));
        let policy = CallPolicy::new(Duration::from_secs(1), RetryConfig::disabled());
        (IntentClassifier::new(model.clone(), policy), model)
    }

    #[test]
    fn test_normalize_intent() {
        assert_eq!(normalize_intent("RAG_QA"), Some(Intent::RagQa));
        assert_eq!(normalize_intent("  rag_qa\n"), Some(Intent::RagQa));
        assert_eq!(normalize_intent("CHITCHAT"), Some(Intent::Chitchat));
        assert_eq!(normalize_intent("smalltalk"), Some(Intent::Chitchat));
        assert_eq!(normalize_intent("Other."), Some(Intent::Other));
        assert_eq!(normalize_intent("banana"), None);
        assert_eq!(normalize_intent(""), None);
    }

    #[tokio::test]
    async fn test_classify_uses_zero_temperature() {
        let (classifier, model) = classifier("CHITCHAT");
        let result = classifier.classify("Hi", &[]).await;

        assert_eq!(result.value, Intent::Chitchat);
        assert_eq!(result.status, StageStatus::Completed);

        let prompts = model.prompts_for(Stage::Classify);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1.temperature, 0.0);
        assert!(prompts[0].0.user.contains("Hi"));
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back() {
        let (classifier, _) = classifier("I think this is a question");
        let result = classifier.classify("What is X?", &[]).await;
        assert_eq!(result.value, Intent::RagQa);
        assert_eq!(result.status, StageStatus::Degraded);
        assert!(result.retryable);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let model = Arc::new(ScriptedModel::new(|_| -> RagResult<String> {
            Err(RagError::model(UpstreamKind::Unavailable, "down"))
        }));
        let classifier = IntentClassifier::new(
            model,
            CallPolicy::new(Duration::from_secs(1), RetryConfig::disabled()),
        );

        let result = classifier.classify("Hello there", &[]).await;
        assert_eq!(result.value, Intent::RagQa);
        assert_eq!(result.status, StageStatus::Degraded);
        assert!(result.detail.unwrap().contains("down"));
    }
}
