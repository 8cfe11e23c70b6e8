//! Ragbot RAG - the retrieval-augmented chat pipeline
//!
//! Intent classification, question condensing, retrieval from a namespaced
//! vector store, grounded answering and follow-up suggestions, plus the
//! ingestion path that fills the store. Model access goes through siumai.

pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod ingest;
pub mod intent;
pub mod llm_client;
pub mod prompts;
pub mod rag_pipeline;
pub mod resilience;
pub mod retriever;
pub mod rewriter;
pub mod storage;
pub mod suggestions;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use answer::AnswerGenerator;
pub use chunking::RecursiveTextSplitter;
pub use embeddings::{Embedder, SiumaiEmbedder};
pub use ingest::Ingestor;
pub use intent::IntentClassifier;
pub use llm_client::{GenerationParams, LanguageModel, SiumaiLanguageModel};
pub use rag_pipeline::ChatPipeline;
pub use retriever::DocumentRetriever;
pub use rewriter::QuestionRewriter;
pub use storage::{InMemoryVectorStore, VectorStore};
pub use suggestions::SuggestionGenerator;
pub use types::*;

#[cfg(feature = "sqlite")]
pub use storage::SqliteVectorStore;
