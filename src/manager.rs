//! # Research Manager
//!
//! Runs one research session end to end:
//!
//! ```text
//! AwaitingQuery -> AwaitingAnswers -> Refining -> Planning -> Searching
//!     -> Writing -> Emailing -> Done
//! ```
//!
//! Any non-terminal phase can drop into `Failed`. Every transition is
//! reported on the progress feed, an ordered stream of short status
//! messages. The last item is either the report or a diagnostic.
//!
//! Sessions share nothing mutable. A session is driven by whoever polls
//! its feed, so dropping the feed cancels whatever calls are in flight.

use async_stream::stream;
use futures::stream::{self, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::agents::{Delegates, Searcher};
use crate::config::{Config, PipelineConfig};
use crate::email::Emailer;
use crate::error::{GenerationError, ResearchError};
use crate::llm::{Delegate, RigBackend};
use crate::tools::WebSearchTool;
use crate::types::{
    ClarificationAnswers, ClarificationQuestions, EmailDispatchOutcome, RefinedQuery, Report,
    SearchResult, SearchTask,
};

/// Sent instead of a session when an answer is missing.
pub const MISSING_ANSWERS_MESSAGE: &str = "Please provide answers to all clarification questions.";

// =============================================================================
// PHASES & PROGRESS
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResearchPhase {
    /// Before [`ResearchManager::clarification_questions`] has been asked.
    /// No feed exists yet, so no update ever carries this phase.
    #[default]
    AwaitingQuery,
    /// Questions were handed out; a feed opens here once `run` is called.
    AwaitingAnswers,
    Refining,
    Planning,
    Searching,
    Writing,
    Emailing,
    Done,
    Failed,
}

impl ResearchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchPhase::Done | ResearchPhase::Failed)
    }
}

/// One item of the progress feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Phase the session was in when the message was emitted
    pub phase: ResearchPhase,
    pub message: String,
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// =============================================================================
// INVOCATION BUDGET
// =============================================================================
/// Ceiling on delegate invocations in one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationBudget {
    limit: usize,
    used: usize,
}

impl InvocationBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.used
    }

    /// Reserve `calls` invocations for `stage`, or fail without reserving.
    pub fn charge(&mut self, stage: &'static str, calls: usize) -> Result<(), ResearchError> {
        if calls > self.remaining() {
            return Err(ResearchError::BudgetExceeded {
                stage,
                requested: calls,
                used: self.used,
                limit: self.limit,
            });
        }
        self.used += calls;
        Ok(())
    }
}

// =============================================================================
// RESEARCH MANAGER
// =============================================================================
/// Owns the delegates and runs sessions over them.
///
/// # Rust Concept: Constructor Injection
///
/// Delegates and the emailer are passed in rather than created here, so a
/// test can hand over scripted backends and a production binary can hand
/// over Rig-backed ones without the manager knowing the difference.
pub struct ResearchManager {
    pipeline: PipelineConfig,
    delegates: Delegates,
    emailer: Option<Emailer>,
}

impl ResearchManager {
    pub fn new(pipeline: PipelineConfig, delegates: Delegates, emailer: Option<Emailer>) -> Self {
        Self {
            pipeline,
            delegates,
            emailer,
        }
    }

    /// Wire up the production stack: Rig provider client, DuckDuckGo
    /// search tool and (when configured) SendGrid.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search_tool = WebSearchTool::new(config.max_search_results)?;
        let backend = Arc::new(RigBackend::from_config(config, search_tool));
        let delegates = Delegates::from_config(backend, config);
        let emailer = Emailer::from_config(&config.email);

        Ok(Self::new(config.pipeline.clone(), delegates, emailer))
    }

    /// First entry point: three questions to ask about `query`.
    ///
    /// Moves a session from `AwaitingQuery` to `AwaitingAnswers`. The call
    /// is outside any session budget.
    pub async fn clarification_questions(
        &self,
        query: &str,
    ) -> Result<ClarificationQuestions, ResearchError> {
        if query.trim().is_empty() {
            return Err(ResearchError::Validation(
                "the research query is empty".to_string(),
            ));
        }

        let questions = self
            .delegates
            .clarifier
            .clarify(query)
            .await
            .map_err(|e| ResearchError::generation(Delegate::Clarifier.name(), e))?;

        info!(query = %query, "Clarification questions ready");
        Ok(questions)
    }

    /// Second entry point: run the whole pipeline and stream progress.
    ///
    /// The feed ends with the report (phase `Done`) or with a diagnostic
    /// (phase `Failed`).
    pub fn run<'a>(
        &'a self,
        query: &'a str,
        answers: ClarificationAnswers,
    ) -> impl Stream<Item = ProgressUpdate> + 'a {
        stream! {
            if query.trim().is_empty() || !answers.is_complete() {
                yield ProgressUpdate {
                    phase: ResearchPhase::Failed,
                    message: MISSING_ANSWERS_MESSAGE.to_string(),
                };
                return;
            }

            let mut session = Session::new(self.pipeline.max_invocations);
            info!(session_id = %session.id, query = %query, "Research session started");
            yield session.update(format!("Research session {} started", session.id));

            // ---- Refining ---------------------------------------------------
            session.transition(ResearchPhase::Refining);
            yield session.update("Creating refined research query...");

            let refined = match session
                .invoke(Delegate::Summarizer, 1, self.delegates.summarizer.refine(query, &answers))
                .await
            {
                Ok(refined) => refined,
                Err(e) => {
                    yield session.fail(e);
                    return;
                }
            };
            yield session.update(describe_refined(&refined));

            // ---- Planning ---------------------------------------------------
            session.transition(ResearchPhase::Planning);
            yield session.update(format!(
                "Planning {} searches...",
                self.delegates.planner.search_count()
            ));

            let tasks = match session
                .invoke(Delegate::Planner, 1, self.delegates.planner.plan(&refined))
                .await
            {
                Ok(tasks) => tasks,
                Err(e) => {
                    yield session.fail(e);
                    return;
                }
            };
            yield session.update(describe_plan(&tasks));

            // ---- Searching --------------------------------------------------
            session.transition(ResearchPhase::Searching);
            yield session.update(format!("Searching {} terms...", tasks.len()));

            let searches = run_searches(
                &self.delegates.searcher,
                &tasks,
                self.pipeline.search_concurrency,
            );
            let results = match session
                .invoke(Delegate::Searcher, 1, async {
                    Ok::<_, GenerationError>(searches.await)
                })
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    yield session.fail(e);
                    return;
                }
            };

            let degraded = results.iter().filter(|r| r.is_degraded()).count();
            if degraded > 0 {
                info!(session_id = %session.id, degraded, "Some searches degraded");
            }
            for (i, result) in results.iter().enumerate() {
                yield session.update(describe_result(i, results.len(), result));
            }

            // ---- Writing ----------------------------------------------------
            session.transition(ResearchPhase::Writing);
            yield session.update("Writing report...");

            let report = match session
                .invoke(Delegate::Writer, 1, self.delegates.writer.write(&refined, &results))
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    yield session.fail(e);
                    return;
                }
            };

            // ---- Emailing ---------------------------------------------------
            let mut email_failure = None;
            match &self.emailer {
                Some(emailer) => {
                    yield session.update("Research completed! Preparing to send email...");
                    session.transition(ResearchPhase::Emailing);

                    let outcome = emailer
                        .send_report(&report)
                        .instrument(session.span.clone())
                        .await;
                    if outcome.is_success() {
                        yield session.update("Email sent successfully!");
                    } else {
                        yield session.update(format!("Email could not be sent: {}", outcome.message));
                        email_failure = Some(outcome);
                    }
                }
                None => {
                    yield session.update("Research completed! Email delivery is not configured, skipping.");
                }
            }

            // ---- Done -------------------------------------------------------
            session.transition(ResearchPhase::Done);
            info!(
                session_id = %session.id,
                invocations = session.budget.used(),
                "Research session finished"
            );
            yield session.update(final_report(&report, email_failure.as_ref()));
        }
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================
/// Per-session bookkeeping: id, tracing span, phase and budget.
struct Session {
    id: Uuid,
    span: Span,
    phase: ResearchPhase,
    budget: InvocationBudget,
}

impl Session {
    fn new(max_invocations: usize) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            span: info_span!("research_session", session_id = %id),
            phase: ResearchPhase::AwaitingAnswers,
            budget: InvocationBudget::new(max_invocations),
        }
    }

    fn transition(&mut self, next: ResearchPhase) {
        debug!(session_id = %self.id, from = ?self.phase, to = ?next, "Phase transition");
        self.phase = next;
    }

    fn update(&self, message: impl Into<String>) -> ProgressUpdate {
        ProgressUpdate {
            phase: self.phase,
            message: message.into(),
        }
    }

    /// Charge the budget, then run the delegate call inside the session span.
    async fn invoke<T, F>(
        &mut self,
        delegate: Delegate,
        calls: usize,
        call: F,
    ) -> Result<T, ResearchError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        self.budget.charge(delegate.name(), calls)?;
        call.instrument(self.span.clone())
            .await
            .map_err(|e| ResearchError::generation(delegate.name(), e))
    }

    fn fail(&mut self, err: ResearchError) -> ProgressUpdate {
        error!(session_id = %self.id, phase = ?self.phase, error = %err, "Research session failed");
        self.transition(ResearchPhase::Failed);
        self.update(format!("Error during research: {}", err))
    }
}

// =============================================================================
// SEARCH FAN-OUT
// =============================================================================
/// Run every task with at most `concurrency` in flight and return results
/// in task order, however the searches finish.
async fn run_searches(
    searcher: &Searcher,
    tasks: &[SearchTask],
    concurrency: usize,
) -> Vec<SearchResult> {
    let mut finished: Vec<(usize, SearchResult)> = stream::iter(tasks.iter().enumerate())
        .map(|(i, task)| async move { (i, searcher.search(task).await) })
        .buffer_unordered(concurrency.max(1))
        .inspect(|(i, result)| {
            debug!(index = i, query = %result.query, degraded = result.is_degraded(), "Search finished");
        })
        .collect()
        .await;

    finished.sort_by_key(|(i, _)| *i);
    finished.into_iter().map(|(_, result)| result).collect()
}

// =============================================================================
// FEED MESSAGES
// =============================================================================
fn describe_refined(refined: &RefinedQuery) -> String {
    let mut message = format!("Refined query: {}", refined.refined_query);
    if !refined.research_focus.is_empty() {
        message.push_str(&format!("\nFocus areas: {}", refined.research_focus.join(", ")));
    }
    message
}

fn describe_plan(tasks: &[SearchTask]) -> String {
    let lines = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("{}. {} ({})", i + 1, task.query, task.reason))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Search plan:\n{}", lines)
}

fn describe_result(index: usize, total: usize, result: &SearchResult) -> String {
    let status = if result.is_degraded() { " [failed]" } else { "" };
    format!(
        "### Search {}/{}{}: {}\n\n{}",
        index + 1,
        total,
        status,
        result.query,
        result.summary
    )
}

fn final_report(report: &Report, email_failure: Option<&EmailDispatchOutcome>) -> String {
    let mut out = format!("## Research Complete!\n\n{}", report.to_markdown());
    if let Some(outcome) = email_failure {
        out.push_str(&format!(
            "\n\n---\n_Note: the report was not e-mailed. {}_",
            outcome.message
        ));
    }
    out
}
