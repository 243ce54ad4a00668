//! # Deep Research
//!
//! A research pipeline that clarifies a query with the user, plans web
//! searches, runs them concurrently, and writes (and optionally e-mails)
//! a markdown report.
//!
//! ```text
//! query ─▶ Clarifier ─▶ 3 questions ─▶ user answers
//!       ─▶ Summarizer ─▶ Planner ─▶ Searcher × N ─▶ Writer ─▶ Emailer
//! ```
//!
//! ## Quick Start
//! ```rust,ignore
//! use deep_research::{ClarificationAnswers, Config, ResearchManager};
//! use futures::StreamExt;
//!
//! let config = Config::from_env()?;
//! let manager = ResearchManager::from_config(&config)?;
//!
//! let questions = manager.clarification_questions("remote work and housing").await?;
//! let answers = ClarificationAnswers::new("overview", "US metros", "a briefing")
//!     .with_questions(&questions);
//!
//! let mut feed = std::pin::pin!(manager.run("remote work and housing", answers));
//! while let Some(update) = feed.next().await {
//!     println!("{update}");
//! }
//! ```

pub mod agents;
pub mod config;
pub mod email;
pub mod error;
pub mod llm;
pub mod manager;
pub mod tools;
pub mod types;

pub use agents::{Clarifier, Delegates, Planner, Searcher, Summarizer, Writer};
pub use config::{Config, EmailConfig, ModelConfig, PipelineConfig, Provider};
pub use email::{Emailer, MailDispatcher, MailMessage, SendGridMailer};
pub use error::{DispatchError, GenerationError, ResearchError};
pub use llm::{CompletionBackend, Delegate, GenerationRequest, RigBackend};
pub use manager::{InvocationBudget, ProgressUpdate, ResearchManager, ResearchPhase};
pub use types::{
    ClarificationAnswers, ClarificationQuestions, DispatchStatus, EmailDispatchOutcome,
    RefinedQuery, Report, SearchPlan, SearchResult, SearchStatus, SearchTask,
};
