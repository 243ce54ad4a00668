//! # Error Module
//!
//! The error taxonomy of a research session. Each enum maps to one failure
//! family; how the orchestrator reacts to it is decided in `manager.rs`:
//! - `ResearchError::Validation` and `ResearchError::Generation` abort the session
//! - `ResearchError::BudgetExceeded` aborts the session
//! - `SearchError` is absorbed into a degraded search result
//! - `DispatchError` is reported next to the finished report

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// DELEGATE ERRORS
// =============================================================================
/// Failure of a single call to the generation capability.
///
/// # Rust Concept: Error Enums
///
/// Every variant carries just enough context to produce a readable
/// diagnostic in the progress feed. The orchestrator never needs to look
/// inside the strings, only at the variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The provider call itself failed (transport, auth, tool loop...)
    #[error("Model call failed: {0}")]
    Backend(String),

    /// The model answered, but not with the requested structure
    #[error("Malformed structured output: {0}")]
    Malformed(String),

    /// The structure parsed but broke the delegate's contract
    /// (wrong number of questions, short search plan, empty fields)
    #[error("Output contract violated: {0}")]
    Contract(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// SESSION ERRORS
// =============================================================================
/// Fatal errors of a research session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResearchError {
    /// Caller input was incomplete; no delegate has been invoked.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A delegate failed in a way the pipeline cannot absorb.
    #[error("{delegate} failed: {source}")]
    Generation {
        delegate: &'static str,
        #[source]
        source: GenerationError,
    },

    /// The session tried to invoke more delegates than its budget allows.
    #[error(
        "Invocation budget exceeded: {stage} needs {requested} more call(s) but {used} of {limit} are already used"
    )]
    BudgetExceeded {
        stage: &'static str,
        requested: usize,
        used: usize,
        limit: usize,
    },
}

impl ResearchError {
    /// Wrap a delegate failure with the delegate's name.
    pub fn generation(delegate: &'static str, source: GenerationError) -> Self {
        Self::Generation { delegate, source }
    }
}

// =============================================================================
// MAIL ERRORS
// =============================================================================
/// Failure to hand a report to the mail-dispatch capability.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Mail provider rejected the credentials")]
    Unauthorized,

    #[error("Mail provider returned HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Network error while sending mail: {0}")]
    Network(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        DispatchError::Network(e.to_string())
    }
}
