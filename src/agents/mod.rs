//! # Delegate Workers
//!
//! The five stateless units of the pipeline. Each wraps one prompt and one
//! output contract around a shared [`CompletionBackend`]:
//!
//! | Delegate     | Input                         | Output                      |
//! |--------------|-------------------------------|-----------------------------|
//! | `Clarifier`  | query                         | 3 clarifying questions      |
//! | `Summarizer` | query + 3 answers             | refined query               |
//! | `Planner`    | refined query                 | N search tasks              |
//! | `Searcher`   | one search task               | one (maybe degraded) result |
//! | `Writer`     | refined query + all results   | report                      |
//!
//! Delegates are plain async callables; the orchestrator owns them and
//! decides when each one runs.

mod clarifier;
mod planner;
mod searcher;
mod summarizer;
mod writer;

pub use clarifier::Clarifier;
pub use planner::Planner;
pub use searcher::Searcher;
pub use summarizer::Summarizer;
pub use writer::Writer;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ModelConfig};
use crate::error::GenerationError;
use crate::llm::CompletionBackend;

/// The full set of delegates a [`crate::ResearchManager`] runs.
#[derive(Clone)]
pub struct Delegates {
    pub clarifier: Clarifier,
    pub summarizer: Summarizer,
    pub planner: Planner,
    pub searcher: Searcher,
    pub writer: Writer,
}

impl Delegates {
    /// Build every delegate on top of one backend.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        models: &ModelConfig,
        search_count: usize,
        search_attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            clarifier: Clarifier::new(backend.clone(), &models.clarifier, timeout),
            summarizer: Summarizer::new(backend.clone(), &models.summarizer, timeout),
            planner: Planner::new(backend.clone(), &models.planner, search_count, timeout),
            searcher: Searcher::new(backend.clone(), &models.searcher, timeout)
                .with_attempts(search_attempts),
            writer: Writer::new(backend, &models.writer, timeout),
        }
    }

    pub fn from_config(backend: Arc<dyn CompletionBackend>, config: &Config) -> Self {
        Self::new(
            backend,
            &config.models,
            config.pipeline.search_count,
            config.pipeline.search_attempts,
            config.pipeline.delegate_timeout,
        )
    }
}

/// Bound a model call by `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, GenerationError>
where
    F: Future<Output = Result<T, GenerationError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(GenerationError::Timeout(limit)))
}

/// Reject empty strings coming back from a model.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), GenerationError> {
    if value.trim().is_empty() {
        return Err(GenerationError::Contract(format!("{} is empty", field)));
    }
    Ok(())
}
