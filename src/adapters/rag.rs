//! Retrieval-augmented response generation.
//!
//! Looks up therapeutic guidance for the detected emotion, folds it into a
//! prompt together with the user's words, and asks the language model for a
//! supportive reply.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{KnowledgeBase, LanguageModel, ResponseGenerator};
use crate::domain::EmotionData;

/// Separator between retrieved documents in the prompt
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Response generator built from a knowledge base and a language model
pub struct RagGenerator {
    knowledge: Arc<dyn KnowledgeBase>,
    model: Arc<dyn LanguageModel>,
    n_results: usize,
}

impl RagGenerator {
    pub fn new(
        knowledge: Arc<dyn KnowledgeBase>,
        model: Arc<dyn LanguageModel>,
        n_results: usize,
    ) -> Self {
        Self {
            knowledge,
            model,
            n_results,
        }
    }
}

/// Knowledge-base query for an emotion label
pub fn search_query(emotion: &str) -> String {
    format!("Therapeutic advice for someone feeling {}.", emotion)
}

/// Prompt sent to the language model
pub fn build_prompt(original_text: &str, emotion: &str, context: &[String]) -> String {
    let context_str = context.join(CONTEXT_SEPARATOR);
    format!(
        "You are an empathetic therapeutic assistant. A user shared this: '{original_text}'. \
         They are feeling {emotion}. Based on this, and the knowledge that '{context_str}', \
         provide multiple, supportive paragraphs (400-500 words) that acknowledge their \
         feelings, integrate a key insight, and offer one gentle, actionable suggestion."
    )
}

#[async_trait]
impl ResponseGenerator for RagGenerator {
    fn name(&self) -> &str {
        "rag"
    }

    async fn generate(&self, original_text: &str, emotion: &EmotionData) -> Result<String> {
        let label = emotion.label();

        let context = self
            .knowledge
            .search(&search_query(label), self.n_results)
            .await
            .context("Knowledge base search failed")?;

        tracing::debug!(emotion = label, documents = context.len(), "Retrieved context");

        let prompt = build_prompt(original_text, label, &context);
        let response = self
            .model
            .generate(&prompt)
            .await
            .with_context(|| format!("Generation with {} failed", self.model.model()))?;

        Ok(response.trim().to_string())
    }
}
