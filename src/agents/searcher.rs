//! Searcher: runs one planned web search and summarizes what it found.
//!
//! A search never fails the session. After the last attempt the error is
//! folded into a degraded [`SearchResult`] that the writer still sees.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{bounded, require_text};
use crate::error::GenerationError;
use crate::llm::{CompletionBackend, Delegate, GenerationRequest};
use crate::types::{SearchResult, SearchTask};

const INSTRUCTIONS: &str = "You are a research assistant. Given a search term and reason, you search the web for that term and \
produce a concise summary of the results. The summary must be 2-3 paragraphs and less than 300 \
words. Capture the main points. Write succinctly, no need to have complete sentences or good \
grammar. This will be consumed by someone synthesizing a report, so it's vital you capture the \
essence and ignore any fluff. Always call the web_search tool before answering. Do not include \
any additional commentary other than the summary itself.";

/// Base delay for exponential backoff between attempts
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct Searcher {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    timeout: Duration,
    attempts: u32,
    retry_delay: Duration,
}

impl Searcher {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: &str, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.to_string(),
            timeout,
            attempts: 1,
            retry_delay: RETRY_BASE_DELAY,
        }
    }

    /// Try each search up to `attempts` times (at least once).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Search for `task` and summarize. Always returns a result.
    pub async fn search(&self, task: &SearchTask) -> SearchResult {
        info!(query = %task.query, "Searching");

        let mut last_error = GenerationError::Backend("no attempt made".to_string());

        for attempt in 0..self.attempts {
            if attempt > 0 {
                let delay = self.retry_delay * 2u32.pow(attempt - 1);
                debug!(query = %task.query, attempt, delay_ms = delay.as_millis() as u64, "Retrying search");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(task).await {
                Ok(summary) => return SearchResult::completed(task, summary.trim()),
                Err(e) => {
                    warn!(query = %task.query, attempt, error = %e, "Search attempt failed");
                    last_error = e;
                }
            }
        }

        SearchResult::degraded(task, last_error)
    }

    async fn attempt(&self, task: &SearchTask) -> Result<String, GenerationError> {
        let request = GenerationRequest::new(
            Delegate::Searcher,
            &self.model,
            INSTRUCTIONS,
            format!("Search term: {}\nReason for searching: {}", task.query, task.reason),
        )
        .with_web_search();

        let summary = bounded(self.timeout, self.backend.complete(request)).await?;
        require_text("summary", &summary)?;
        Ok(summary)
    }
}
