//! Summarizer: folds the user's answers into a refined query.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{bounded, require_text};
use crate::error::GenerationError;
use crate::llm::{generate_structured, CompletionBackend, Delegate, GenerationRequest};
use crate::types::{ClarificationAnswers, RefinedQuery};

const INSTRUCTIONS: &str = r#"You are a research query refinement assistant. Given an original query
and the user's responses to clarification questions, create a refined, comprehensive query that
will guide the research process.

Your refined query should be specific, actionable, and incorporate EVERY one of the user's
clarifications to ensure the research addresses their actual needs.

For research_focus, list the concrete topics the research should cover. Name topics, do not
restate the question."#;

#[derive(Clone)]
pub struct Summarizer {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: &str, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.to_string(),
            timeout,
        }
    }

    /// Merge `query` and `answers` into a [`RefinedQuery`].
    ///
    /// The orchestrator validates the answers first, so this only fails on
    /// the model side.
    pub async fn refine(
        &self,
        query: &str,
        answers: &ClarificationAnswers,
    ) -> Result<RefinedQuery, GenerationError> {
        info!(query = %query, "Refining research query");

        let input = format!(
            "Original Query: {}\n\nUser's Clarification Responses:\n{}\n\n\
             Please create a refined query that incorporates these clarifications.",
            query,
            answers.to_prompt_block()
        );
        let request = GenerationRequest::new(Delegate::Summarizer, &self.model, INSTRUCTIONS, input);

        let mut refined: RefinedQuery =
            bounded(self.timeout, generate_structured(self.backend.as_ref(), request)).await?;

        require_text("refined_query", &refined.refined_query)?;

        // The original query is the caller's, not the model's paraphrase of it.
        refined.original_query = query.to_string();
        refined.research_focus.retain(|topic| !topic.trim().is_empty());

        Ok(refined)
    }
}
