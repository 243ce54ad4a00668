//! Writer: synthesizes every search summary into the final report.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{bounded, require_text};
use crate::error::GenerationError;
use crate::llm::{generate_structured, CompletionBackend, Delegate, GenerationRequest};
use crate::types::{RefinedQuery, Report, SearchResult};

const INSTRUCTIONS: &str = "You are a senior researcher tasked with writing a cohesive report for a research query. \
You will be provided with the original refined query, and search results from multiple searches.\n\
You should first come up with an outline for the report that describes the structure and \
flow of the report. Then, generate the report and return that as your final output.\n\
The final output should be in markdown format, and it should be lengthy and detailed. Aim \
for 5-10 pages of content, at least 1000 words.\n\
Use every search result you are given. Only cite sources that appear in the search results; \
results marked as failed contain no findings and must not be cited.";

#[derive(Clone)]
pub struct Writer {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    timeout: Duration,
}

impl Writer {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: &str, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.to_string(),
            timeout,
        }
    }

    pub async fn write(
        &self,
        refined: &RefinedQuery,
        results: &[SearchResult],
    ) -> Result<Report, GenerationError> {
        info!(results = results.len(), "Writing report");

        let request = GenerationRequest::new(
            Delegate::Writer,
            &self.model,
            INSTRUCTIONS,
            render_input(refined, results),
        );
        let report: Report =
            bounded(self.timeout, generate_structured(self.backend.as_ref(), request)).await?;

        require_text("markdown_report", &report.markdown_report)?;
        Ok(report)
    }
}

/// The writer's input: the refined query, its focus areas, then every
/// result in plan order.
fn render_input(refined: &RefinedQuery, results: &[SearchResult]) -> String {
    let mut input = format!("Refined research query: {}\n", refined.refined_query);
    if !refined.research_focus.is_empty() {
        input.push_str(&format!(
            "Focus areas: {}\n",
            refined.research_focus.join(", ")
        ));
    }

    input.push_str("\nSearch Results:\n");
    for (i, result) in results.iter().enumerate() {
        let marker = if result.is_degraded() { " (FAILED)" } else { "" };
        input.push_str(&format!(
            "\n### Search {}{}: {}\nReason: {}\n{}\n",
            i + 1,
            marker,
            result.query,
            result.reason,
            result.summary
        ));
    }

    input.push_str(
        "\nPlease create a comprehensive report that:\n\
         1. Creates an outline for the report structure\n\
         2. Synthesizes all search results into a cohesive document\n\
         3. Aims for 5-10 pages of content, at least 1000 words\n\
         4. Uses markdown formatting",
    );
    input
}
