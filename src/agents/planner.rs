//! Planner: turns a refined query into exactly N web searches.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{bounded, require_text};
use crate::error::GenerationError;
use crate::llm::{generate_structured, CompletionBackend, Delegate, GenerationRequest};
use crate::types::{RefinedQuery, SearchPlan, SearchTask};

#[derive(Clone)]
pub struct Planner {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    search_count: usize,
    timeout: Duration,
}

impl Planner {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: &str,
        search_count: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            model: model.to_string(),
            search_count,
            timeout,
        }
    }

    pub fn search_count(&self) -> usize {
        self.search_count
    }

    fn instructions(&self) -> String {
        format!(
            "You are a helpful research assistant. Given a query, come up with a set of web searches \
             to perform to best answer the query. Output exactly {} terms to query for. For each \
             search, explain in `reason` how it serves the refined query.",
            self.search_count
        )
    }

    /// Plan the searches for `refined`.
    ///
    /// A plan shorter than the configured count, or with an empty field, is
    /// a contract violation. Extra searches are dropped.
    pub async fn plan(&self, refined: &RefinedQuery) -> Result<Vec<SearchTask>, GenerationError> {
        info!(searches = self.search_count, "Planning searches");

        let mut input = format!("Refined Query: {}", refined.refined_query);
        if !refined.research_focus.is_empty() {
            input.push_str("\nFocus areas: ");
            input.push_str(&refined.research_focus.join(", "));
        }

        let request = GenerationRequest::new(Delegate::Planner, &self.model, self.instructions(), input);
        let plan: SearchPlan =
            bounded(self.timeout, generate_structured(self.backend.as_ref(), request)).await?;

        let mut searches = plan.searches;
        if searches.len() < self.search_count {
            return Err(GenerationError::Contract(format!(
                "expected {} searches, got {}",
                self.search_count,
                searches.len()
            )));
        }
        if searches.len() > self.search_count {
            warn!(
                expected = self.search_count,
                got = searches.len(),
                "Planner returned extra searches, truncating"
            );
            searches.truncate(self.search_count);
        }

        for (i, task) in searches.iter().enumerate() {
            require_text(&format!("searches[{}].reason", i), &task.reason)?;
            require_text(&format!("searches[{}].query", i), &task.query)?;
        }

        Ok(searches)
    }
}
