//! Clarifier: asks three questions about a fresh query.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{bounded, require_text};
use crate::error::GenerationError;
use crate::llm::{generate_structured, CompletionBackend, Delegate, GenerationRequest};
use crate::types::ClarificationQuestions;

const INSTRUCTIONS: &str = r#"You are a research clarification assistant. Given a user's initial research query,
you need to ask 3 thoughtful questions that will help clarify and refine their research needs.

Your questions should help understand:
1. The scope and depth they want
2. The specific aspects they're most interested in
3. The context or purpose of their research

Generate exactly 3 questions that will help create a more focused and comprehensive research plan."#;

#[derive(Clone)]
pub struct Clarifier {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    timeout: Duration,
}

impl Clarifier {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: &str, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.to_string(),
            timeout,
        }
    }

    /// Produce exactly three non-empty questions for `query`.
    pub async fn clarify(&self, query: &str) -> Result<ClarificationQuestions, GenerationError> {
        info!(query = %query, "Generating clarification questions");

        let request = GenerationRequest::new(
            Delegate::Clarifier,
            &self.model,
            INSTRUCTIONS,
            format!("User's research query: {}", query),
        );
        let questions: ClarificationQuestions =
            bounded(self.timeout, generate_structured(self.backend.as_ref(), request)).await?;

        require_text("question_1", &questions.question_1)?;
        require_text("question_2", &questions.question_2)?;
        require_text("question_3", &questions.question_3)?;

        Ok(questions)
    }
}
