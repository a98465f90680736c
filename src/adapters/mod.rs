//! Adapter interfaces for the pipeline's collaborators.
//!
//! The orchestrator only sees the traits defined here. Concrete adapters talk
//! to the emotion classifier service, the retrieval service and the hosted
//! language model, or write the final response somewhere a human can read it.

pub mod classifier;
pub mod gemini;
pub mod rag;
pub mod retrieval;
pub mod sink;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{EmotionData, JobId, PipelineResult};

// Re-export the concrete adapters
pub use classifier::HttpEmotionClassifier;
pub use gemini::GeminiModel;
pub use rag::RagGenerator;
pub use retrieval::HttpKnowledgeBase;
pub use sink::{ConsoleSink, FileSink};

/// Text → emotion label (and optional scores)
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Classify a transcription
    async fn predict(&self, text: &str) -> Result<EmotionData>;
}

/// Text + emotion → final response
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Generate the response for a transcription
    async fn generate(&self, original_text: &str, emotion: &EmotionData) -> Result<String>;
}

/// Destination for final responses
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Deliver one job's response
    async fn emit(&self, job: &JobId, result: &PipelineResult) -> Result<()>;
}

/// Similarity search over the knowledge corpus
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Return up to `n_results` documents relevant to `query`
    async fn search(&self, query: &str, n_results: usize) -> Result<Vec<String>>;
}

/// Hosted generative text model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier (for logs)
    fn model(&self) -> &str;

    /// Complete a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}
