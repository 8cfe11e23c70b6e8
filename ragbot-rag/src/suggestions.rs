//! Follow-up question suggestions

use crate::llm_client::{temperatures, GenerationParams, LanguageModel};
use crate::prompts::{format_context, suggestions_prompt};
use crate::resilience::{guarded, CallPolicy, Upstream};
use crate::types::{RetrievedChunk, StageResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lowercased, whitespace-collapsed form used for comparisons
fn comparison_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('?')
        .trim_end()
        .to_lowercase()
}

/// Remove one leading `-`/`*` bullet or `1.`/`1)` number
fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*']) {
        return rest.trim_start();
    }

    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line
}

/// Candidate lines: a JSON array of strings when the output is one,
/// otherwise every non-empty line with bullets and numbering removed.
/// Lines ending in `:` introduce a list and are dropped.
fn candidates(raw: &str) -> Vec<String> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw.trim()) {
        return items;
    }
    raw.lines()
        .map(|line| strip_list_marker(line.trim()).trim().to_string())
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .collect()
}

/// Parse model output into at most `max` distinct questions that differ
/// from `question`
pub fn parse_suggestions(raw: &str, question: &str, max: usize) -> Vec<String> {
    let original = comparison_key(question);
    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();

    for candidate in candidates(raw) {
        let mut text = candidate.trim().to_string();
        if text.is_empty() {
            continue;
        }
        if !text.ends_with('?') {
            text.push('?');
        }

        let key = comparison_key(&text);
        if key == original || !seen.insert(key) {
            continue;
        }

        suggestions.push(text);
        if suggestions.len() == max {
            break;
        }
    }

    suggestions
}

pub struct SuggestionGenerator {
    model: Arc<dyn LanguageModel>,
    policy: CallPolicy,
    enabled: bool,
    max_suggestions: usize,
}

impl SuggestionGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        policy: CallPolicy,
        enabled: bool,
        max_suggestions: usize,
    ) -> Self {
        Self {
            model,
            policy,
            enabled,
            max_suggestions,
        }
    }

    pub async fn generate(
        &self,
        question: &str,
        answer: &str,
        chunks: &[RetrievedChunk],
    ) -> StageResult<Vec<String>> {
        if !self.enabled || self.max_suggestions == 0 {
            return StageResult::skipped(Vec::new(), "suggestions disabled");
        }

        let prompt = suggestions_prompt(question, answer, &format_context(chunks));
        let params = GenerationParams::with_temperature(temperatures::SUGGEST);

        let raw = guarded(&self.policy, Upstream::Model, "suggest_questions", || {
            self.model.submit(&prompt, &params)
        })
        .await;

        match raw {
            Ok(raw) => {
                let suggestions = parse_suggestions(&raw, question, self.max_suggestions);
                debug!(count = suggestions.len(), "Generated follow-up questions");
                StageResult::completed(suggestions)
            }
            Err(error) => {
                warn!(error = %error, "Suggestion generation failed");
                StageResult::fallback(Vec::new(), &error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use crate::types::{Stage, StageStatus, UpstreamKind};
    use ragbot_core::RetryConfig;
    use std::time::Duration;

    fn policy() -> CallPolicy {
        CallPolicy::new(Duration::from_secs(1), RetryConfig::disabled())
    }

    #[test]
    fn test_parse_json_array() {
        let raw = r#"["How does it scale?", "What does it cost", "how  does it SCALE?"]"#;
        assert_eq!(
            parse_suggestions(raw, "What is it?", 5),
            vec!["How does it scale?", "What does it cost?"]
        );
    }

    #[test]
    fn test_parse_bulleted_lines() {
        let raw = "Here you go:\n1. First question\n2) Second question?\n- Third\n\n* Fourth";
        let parsed = parse_suggestions(raw, "q", 10);
        assert_eq!(
            parsed,
            vec![
                "First question?",
                "Second question?",
                "Third?",
                "Fourth?"
            ]
        );
    }

    #[test]
    fn test_numbers_inside_questions_survive() {
        let raw = "1. 3D printing: how does it work?\n2. 2024 roadmap changes?\n- -5 degrees outside?";
        assert_eq!(
            parse_suggestions(raw, "q", 5),
            vec![
                "3D printing: how does it work?",
                "2024 roadmap changes?",
                "-5 degrees outside?"
            ]
        );
        assert_eq!(parse_suggestions("42 is the answer", "q", 5), vec!["42 is the answer?"]);
    }

    #[test]
    fn test_drops_original_question_and_truncates() {
        let raw = r#"["What is Rust?", "A?", "B?", "C?"]"#;
        assert_eq!(parse_suggestions(raw, "what is rust", 2), vec!["A?", "B?"]);
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_suggestions("", "q", 5).is_empty());
        assert!(parse_suggestions("[]", "q", 5).is_empty());
    }

    #[tokio::test]
    async fn test_generate_dedupes_and_uses_temperature() {
        let model = Arc::new(ScriptedModel::happy());
        let generator = SuggestionGenerator::new(model.clone(), policy(), true, 5);
        let result = generator.generate("Is the sky green?", "No.", &[]).await;

        assert_eq!(result.status, StageStatus::Completed);
        assert_eq!(result.value.len(), 3);
        assert_eq!(model.prompts_for(Stage::Suggest)[0].1.temperature, 0.5);
    }

    #[tokio::test]
    async fn test_disabled_skips_model() {
        let model = Arc::new(ScriptedModel::happy());
        let generator = SuggestionGenerator::new(model.clone(), policy(), false, 5);
        let result = generator.generate("Q?", "A", &[]).await;
        assert_eq!(result.status, StageStatus::Skipped);
        assert!(result.value.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_empty_list() {
        let model = Arc::new(ScriptedModel::failing_at(Stage::Suggest, UpstreamKind::Unavailable));
        let generator = SuggestionGenerator::new(model, policy(), true, 5);
        let result = generator.generate("Q?", "A", &[]).await;
        assert_eq!(result.status, StageStatus::Degraded);
        assert!(result.value.is_empty());
    }
}
