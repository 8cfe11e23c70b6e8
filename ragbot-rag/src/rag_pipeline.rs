//! Chat pipeline
//!
//! Runs one chat turn through the stages:
//! validate, classify, then either a chitchat reply or rewrite, retrieve,
//! answer (and optionally self-check) and suggest.
//!
//! Stages that can degrade record a fallback in the trace and the turn goes
//! on. Retrieval, answer and chitchat failures abort the turn with
//! [`RagError::PipelineAbort`]; no partial response is ever returned.

use crate::answer::AnswerGenerator;
use crate::embeddings::Embedder;
use crate::intent::IntentClassifier;
use crate::llm_client::LanguageModel;
use crate::resilience::CallPolicy;
use crate::retriever::DocumentRetriever;
use crate::rewriter::QuestionRewriter;
use crate::storage::VectorStore;
use crate::suggestions::SuggestionGenerator;
use crate::types::{
    ChatRequest, ChatResponse, ChatTurn, Namespace, PipelineOutcome, RagError, RagResult, Stage,
    StageRecord, StageStatus,
};
use ragbot_core::performance::timed_async;
use ragbot_core::{log_operation_error, log_operation_start, log_operation_success, RagbotConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_TONE: &str = "neutral";
pub const DEFAULT_STYLE: &str = "concise";

/// A request that passed validation, with every default filled in
#[derive(Debug, Clone)]
struct TurnInput {
    question: String,
    history: Vec<ChatTurn>,
    tone: String,
    style: String,
    top_k: usize,
    namespace: Namespace,
    conversation_id: String,
    use_self_check: bool,
    debug: bool,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn completed(stage: Stage, duration: Duration) -> StageRecord {
    StageRecord {
        stage,
        status: StageStatus::Completed,
        detail: None,
        retryable: false,
        duration_ms: millis(duration),
    }
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub struct ChatPipeline {
    classifier: IntentClassifier,
    rewriter: QuestionRewriter,
    retriever: DocumentRetriever,
    answerer: AnswerGenerator,
    suggester: SuggestionGenerator,
    default_namespace: Namespace,
    default_top_k: usize,
    max_top_k: usize,
    max_question_chars: usize,
    model_name: String,
}

impl ChatPipeline {
    pub fn new(
        config: &RagbotConfig,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> RagResult<Self> {
        let llm_policy = CallPolicy::for_llm(config);

        Ok(Self {
            classifier: IntentClassifier::new(model.clone(), llm_policy.clone()),
            rewriter: QuestionRewriter::new(
                model.clone(),
                llm_policy.clone(),
                config.chat.max_history_turns,
            ),
            retriever: DocumentRetriever::new(config, embedder, store),
            answerer: AnswerGenerator::new(config, model.clone()),
            suggester: SuggestionGenerator::new(
                model.clone(),
                llm_policy,
                config.suggestions.enabled,
                config.suggestions.max_suggestions,
            ),
            default_namespace: Namespace::parse(&config.retrieval.default_namespace)?,
            default_top_k: config.retrieval.default_top_k,
            max_top_k: config.retrieval.max_top_k,
            max_question_chars: config.chat.max_question_chars,
            model_name: model.describe(),
        })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        self.retriever.store()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Answer one chat turn
    pub async fn run(&self, request: ChatRequest) -> RagResult<ChatResponse> {
        let started = Instant::now();
        let input = self.validate(request)?;
        let mut trace = vec![completed(Stage::Validate, started.elapsed())];

        log_operation_start!(
            "chat_turn",
            conversation_id = %input.conversation_id,
            namespace = %input.namespace,
            top_k = input.top_k
        );

        let outcome = match self.process(&input, &mut trace).await {
            Ok(outcome) => outcome,
            Err(error) => {
                log_operation_error!("chat_turn", error, conversation_id = %input.conversation_id);
                return Err(error);
            }
        };

        log_operation_success!(
            "chat_turn",
            conversation_id = %input.conversation_id,
            intent = %outcome.intent(),
            total_time_ms = millis(started.elapsed())
        );

        let trace = input.debug.then_some(trace);
        Ok(outcome.into_response(input.conversation_id, trace))
    }

    /// Check the request and fill in defaults; runs before any upstream call
    fn validate(&self, request: ChatRequest) -> RagResult<TurnInput> {
        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Err(RagError::validation("question", "must not be empty"));
        }
        let length = question.chars().count();
        if length > self.max_question_chars {
            return Err(RagError::validation(
                "question",
                format!(
                    "is {} characters long, the limit is {}",
                    length, self.max_question_chars
                ),
            ));
        }

        let top_k = match request.top_k {
            None => self.default_top_k,
            Some(0) => return Err(RagError::validation("top_k", "must be at least 1")),
            Some(k) if k > self.max_top_k => {
                warn!(requested = k, max = self.max_top_k, "Clamping top_k");
                self.max_top_k
            }
            Some(k) => k,
        };

        let namespace = Namespace::resolve(request.namespace.as_deref(), &self.default_namespace)?;

        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(TurnInput {
            question,
            history: request.history,
            tone: or_default(request.tone, DEFAULT_TONE),
            style: or_default(request.style, DEFAULT_STYLE),
            top_k,
            namespace,
            conversation_id,
            use_self_check: request.use_self_check,
            debug: request.debug,
        })
    }

    async fn process(
        &self,
        input: &TurnInput,
        trace: &mut Vec<StageRecord>,
    ) -> RagResult<PipelineOutcome> {
        let (classified, elapsed) = timed_async(
            "classify",
            self.classifier.classify(&input.question, &input.history),
        )
        .await;
        trace.push(classified.record(Stage::Classify, millis(elapsed)));
        let intent = classified.value;

        if !intent.needs_retrieval() {
            debug!(intent = %intent, "Short-circuiting to a chitchat reply");
            let (reply, elapsed) = timed_async(
                "chitchat",
                self.answerer
                    .chitchat(&input.question, &input.history, &input.tone, &input.style),
            )
            .await;
            let answer = reply.map_err(|e| RagError::abort(Stage::Chitchat, e))?;
            trace.push(completed(Stage::Chitchat, elapsed));
            return Ok(PipelineOutcome::ShortCircuited { intent, answer });
        }

        let (rewritten, elapsed) = timed_async(
            "rewrite",
            self.rewriter.rewrite(&input.history, &input.question),
        )
        .await;
        trace.push(rewritten.record(Stage::Rewrite, millis(elapsed)));
        let standalone_question = rewritten.value;

        let (retrieved, elapsed) = timed_async(
            "retrieve",
            self.retriever
                .retrieve(&standalone_question, &input.namespace, input.top_k),
        )
        .await;
        let sources = retrieved.map_err(|e| RagError::abort(Stage::Retrieve, e))?;
        trace.push(completed(Stage::Retrieve, elapsed));

        let (generated, elapsed) = timed_async(
            "answer",
            self.answerer
                .generate(&standalone_question, &sources, &input.tone, &input.style),
        )
        .await;
        let mut answer = generated.map_err(|e| RagError::abort(Stage::Answer, e))?;
        trace.push(completed(Stage::Answer, elapsed));

        if input.use_self_check {
            let (checked, elapsed) = timed_async(
                "self_check",
                self.answerer.self_check(&standalone_question, &sources, answer),
            )
            .await;
            trace.push(checked.record(Stage::SelfCheck, millis(elapsed)));
            answer = checked.value;
        }

        let (suggested, elapsed) = timed_async(
            "suggest",
            self.suggester.generate(&input.question, &answer, &sources),
        )
        .await;
        trace.push(suggested.record(Stage::Suggest, millis(elapsed)));

        Ok(PipelineOutcome::FullyProcessed {
            intent,
            standalone_question,
            sources,
            answer,
            suggestions: suggested.value,
        })
    }
}
