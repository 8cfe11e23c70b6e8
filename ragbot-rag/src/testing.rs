//! Deterministic stand-ins for the external services, for tests

use crate::embeddings::Embedder;
use crate::llm_client::{GenerationParams, LanguageModel};
use crate::prompts::Prompt;
use crate::storage::VectorStore;
use crate::types::{
    ChunkRecord, Namespace, RagError, RagResult, ScoredChunk, Stage, UpstreamKind,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Responder = dyn Fn(&Prompt) -> RagResult<String> + Send + Sync;

/// Language model answering from a closure, recording every prompt it sees
pub struct ScriptedModel {
    responder: Box<Responder>,
    prompts: Mutex<Vec<(Prompt, GenerationParams)>>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Prompt) -> RagResult<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Plausible replies for every stage
    pub fn happy() -> Self {
        Self::new(default_reply)
    }

    /// Like [`ScriptedModel::happy`] but `stage` fails with `kind`
    pub fn failing_at(stage: Stage, kind: UpstreamKind) -> Self {
        Self::new(move |prompt| {
            if prompt.task == stage {
                Err(RagError::model(kind, format!("{} is down", stage)))
            } else {
                default_reply(prompt)
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn calls_for(&self, stage: Stage) -> usize {
        self.prompts
            .lock()
            .map(|p| p.iter().filter(|(prompt, _)| prompt.task == stage).count())
            .unwrap_or(0)
    }

    pub fn prompts_for(&self, stage: Stage) -> Vec<(Prompt, GenerationParams)> {
        self.prompts
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|(prompt, _)| prompt.task == stage)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Greetings are small talk, everything else is a knowledge question
pub fn default_reply(prompt: &Prompt) -> RagResult<String> {
    let reply = match prompt.task {
        Stage::Classify => {
            let message = prompt
                .user
                .split("User message:")
                .nth(1)
                .unwrap_or_default()
                .to_lowercase();
            let first_word = message
                .split(|c: char| !c.is_alphanumeric())
                .find(|w| !w.is_empty())
                .unwrap_or_default();
            if matches!(first_word, "hi" | "hello" | "hey" | "thanks") {
                "CHITCHAT"
            } else {
                "RAG_QA"
            }
        }
        Stage::Rewrite => "What is the standalone question?",
        Stage::Answer => "Answer:\nThe sky is blue [S1].",
        Stage::SelfCheck => "Answer:\nThe sky is blue, as stated in [S1].",
        Stage::Suggest => {
            r#"["Why is the sky blue?", "What color is the sea?", "why is the sky blue", "Does the sky change color at sunset?"]"#
        }
        Stage::Chitchat => "Hello! How can I help you today?",
        Stage::Validate | Stage::Retrieve => "",
    };
    Ok(reply.to_string())
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn submit(&self, prompt: &Prompt, params: &GenerationParams) -> RagResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((prompt.clone(), *params));
        }
        (self.responder)(prompt)
    }

    fn describe(&self) -> String {
        "scripted/test".to_string()
    }
}

/// Bag-of-words embedder: lowercase alphanumeric tokens hashed into buckets
pub struct HashEmbedder {
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: 256,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails as if the service were down
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::model(
                UpstreamKind::Unavailable,
                "embedding service unavailable",
            ));
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Vector store whose every operation fails with a connectivity error
pub struct UnavailableStore;

#[async_trait]
impl VectorStore for UnavailableStore {
    async fn upsert(&self, _namespace: &Namespace, _records: Vec<ChunkRecord>) -> RagResult<usize> {
        Err(RagError::store("connection refused"))
    }

    async fn query(
        &self,
        _namespace: &Namespace,
        _vector: &[f32],
        _top_k: usize,
    ) -> RagResult<Vec<ScoredChunk>> {
        Err(RagError::store("connection refused"))
    }

    async fn count(&self, _namespace: &Namespace) -> RagResult<usize> {
        Err(RagError::store("connection refused"))
    }

    async fn ping(&self) -> RagResult<()> {
        Err(RagError::store("connection refused"))
    }

    fn backend(&self) -> &'static str {
        "unavailable"
    }
}
