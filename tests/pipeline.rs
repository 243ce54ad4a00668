//! Pipeline tests for the research manager.
//!
//! Every external collaborator is replaced by an in-process double:
//! - `ScriptedBackend` answers each delegate with canned JSON or text
//! - `RecordingMailer` accepts or rejects mail and remembers it

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deep_research::{
    ClarificationAnswers, CompletionBackend, Delegate, Delegates, DispatchError, Emailer, GenerationError,
    GenerationRequest, MailDispatcher, MailMessage, ModelConfig, PipelineConfig, ProgressUpdate,
    ResearchError, ResearchManager, ResearchPhase,
};

const QUERY: &str = "impact of remote work on urban housing";

// =============================================================================
// TEST DOUBLES
// =============================================================================
#[derive(Default)]
struct ScriptedBackend {
    requests: Mutex<Vec<GenerationRequest>>,
    plan_size: usize,
    failing_terms: HashSet<String>,
    delays: HashMap<String, Duration>,
    stalled: Option<(Delegate, Duration)>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    fn new(plan_size: usize) -> Self {
        Self {
            plan_size,
            ..Self::default()
        }
    }

    fn failing(mut self, term: &str) -> Self {
        self.failing_terms.insert(term.to_string());
        self
    }

    fn delayed(mut self, term: &str, delay: Duration) -> Self {
        self.delays.insert(term.to_string(), delay);
        self
    }

    /// Every search takes `delay`.
    fn all_delayed(mut self, delay: Duration) -> Self {
        for i in 1..=self.plan_size {
            self.delays.insert(format!("term {i}"), delay);
        }
        self
    }

    fn stalling(mut self, delegate: Delegate, delay: Duration) -> Self {
        self.stalled = Some((delegate, delay));
        self
    }

    fn peak_searches(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn calls_to(&self, delegate: Delegate) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.delegate == delegate)
            .cloned()
            .collect()
    }

    fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Text after `prefix` on the first line that starts with it.
fn line_value<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    input
        .lines()
        .find_map(|line| line.trim().strip_prefix(prefix))
        .map(str::trim)
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some((delegate, delay)) = self.stalled {
            if delegate == request.delegate {
                tokio::time::sleep(delay).await;
            }
        }

        match request.delegate {
            Delegate::Clarifier => Ok(json!({
                "question_1": "How deep should the research go?",
                "question_2": "Which housing markets matter most?",
                "question_3": "What will the research be used for?"
            })
            .to_string()),

            Delegate::Summarizer => {
                let answers: Vec<&str> = request
                    .input
                    .lines()
                    .filter_map(|line| line.split_once("Response: ").map(|(_, a)| a.trim()))
                    .collect();
                Ok(json!({
                    "original_query": QUERY,
                    "clarifications": answers.join("; "),
                    "refined_query": format!("Remote work and housing, covering {}", answers.join(", ")),
                    "research_focus": ["suburban rents", "office conversions"]
                })
                .to_string())
            }

            Delegate::Planner => {
                let searches: Vec<_> = (1..=self.plan_size)
                    .map(|i| json!({"reason": format!("covers angle {i}"), "query": format!("term {i}")}))
                    .collect();
                Ok(json!({ "searches": searches }).to_string())
            }

            Delegate::Searcher => {
                let term = line_value(&request.input, "Search term:")
                    .unwrap_or_default()
                    .to_string();
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
                if let Some(delay) = self.delays.get(&term) {
                    tokio::time::sleep(*delay).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                if self.failing_terms.contains(&term) {
                    return Err(GenerationError::Backend("search tool unavailable".to_string()));
                }
                Ok(format!("Summary of {term}"))
            }

            Delegate::Writer => {
                let focus = line_value(&request.input, "Focus areas:").unwrap_or_default();
                let sections: Vec<&str> = request
                    .input
                    .lines()
                    .filter(|line| line.starts_with("### Search"))
                    .collect();
                Ok(json!({
                    "short_summary": "Remote work reshaped housing demand.",
                    "markdown_report": format!(
                        "# Remote Work and Urban Housing\n\nFocus: {focus}\n\n{}",
                        sections.join("\n")
                    ),
                    "follow_up_questions": ["How durable is the shift?"]
                })
                .to_string())
            }
        }
    }
}

struct RecordingMailer {
    fail: bool,
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MailDispatcher for RecordingMailer {
    async fn dispatch(&self, message: &MailMessage) -> Result<u16, DispatchError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            Err(DispatchError::Http(500, "mail relay down".to_string()))
        } else {
            Ok(202)
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================
fn pipeline() -> PipelineConfig {
    PipelineConfig {
        search_concurrency: 5,
        search_attempts: 1,
        delegate_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

fn manager_with(
    backend: Arc<ScriptedBackend>,
    pipeline: PipelineConfig,
    emailer: Option<Emailer>,
) -> ResearchManager {
    let delegates = Delegates::new(
        backend,
        &ModelConfig::uniform("test-model"),
        pipeline.search_count,
        pipeline.search_attempts,
        pipeline.delegate_timeout,
    );
    ResearchManager::new(pipeline, delegates, emailer)
}

fn answers() -> ClarificationAnswers {
    ClarificationAnswers::new(
        "a policy-level overview",
        "large US metros",
        "a city council briefing",
    )
}

async fn run_to_end(manager: &ResearchManager, answers: ClarificationAnswers) -> Vec<ProgressUpdate> {
    manager.run(QUERY, answers).collect().await
}

fn search_items(updates: &[ProgressUpdate]) -> Vec<&ProgressUpdate> {
    updates
        .iter()
        .filter(|u| u.message.starts_with("### Search"))
        .collect()
}

// =============================================================================
// CLARIFICATION
// =============================================================================
#[tokio::test]
async fn test_clarification_returns_three_questions() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let questions = manager.clarification_questions(QUERY).await.unwrap();

    assert!(questions.is_complete());
    assert_eq!(questions.as_array().len(), 3);
    assert_eq!(backend.calls_to(Delegate::Clarifier).len(), 1);
}

#[tokio::test]
async fn test_clarification_rejects_empty_query() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let err = manager.clarification_questions("   ").await.unwrap_err();

    assert!(matches!(err, ResearchError::Validation(_)));
    assert_eq!(backend.total_calls(), 0);
}

// =============================================================================
// END TO END
// =============================================================================
#[tokio::test]
async fn test_end_to_end_report() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let updates = run_to_end(&manager, answers()).await;

    let last = updates.last().unwrap();
    assert_eq!(last.phase, ResearchPhase::Done);
    assert!(last.message.starts_with("## Research Complete!"));
    assert!(last.message.contains("Focus: suburban rents, office conversions"));
    assert!(last.message.contains("How durable is the shift?"));

    // Exactly five search summaries, in plan order, before the report.
    let searches = search_items(&updates);
    assert_eq!(searches.len(), 5);
    for (i, item) in searches.iter().enumerate() {
        assert!(item
            .message
            .starts_with(&format!("### Search {}/5: term {}", i + 1, i + 1)));
        assert_eq!(item.phase, ResearchPhase::Searching);
    }

    // The refined query carries every answer.
    let refined = updates
        .iter()
        .find(|u| u.message.starts_with("Refined query:"))
        .unwrap();
    for answer in answers().answers() {
        assert!(refined.message.contains(answer.as_str()));
    }

    // Phases only move forward.
    let phases: Vec<ResearchPhase> = updates.iter().map(|u| u.phase).collect();
    let order = [
        ResearchPhase::AwaitingAnswers,
        ResearchPhase::Refining,
        ResearchPhase::Planning,
        ResearchPhase::Searching,
        ResearchPhase::Writing,
        ResearchPhase::Done,
    ];
    let ranks: Vec<usize> = phases
        .iter()
        .map(|p| order.iter().position(|o| o == p).unwrap())
        .collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(backend.calls_to(Delegate::Summarizer).len(), 1);
    assert_eq!(backend.calls_to(Delegate::Planner).len(), 1);
    assert_eq!(backend.calls_to(Delegate::Searcher).len(), 5);
    assert_eq!(backend.calls_to(Delegate::Writer).len(), 1);
    assert!(backend.calls_to(Delegate::Searcher).iter().all(|r| r.web_search));
}

#[tokio::test]
async fn test_writer_sees_results_in_plan_order_despite_completion_order() {
    // Earlier terms finish last.
    let backend = Arc::new(
        ScriptedBackend::new(5)
            .delayed("term 1", Duration::from_millis(120))
            .delayed("term 2", Duration::from_millis(90))
            .delayed("term 3", Duration::from_millis(60))
            .delayed("term 4", Duration::from_millis(30)),
    );
    let manager = manager_with(backend.clone(), pipeline(), None);

    let updates = run_to_end(&manager, answers()).await;
    assert_eq!(updates.last().unwrap().phase, ResearchPhase::Done);

    let writer_input = &backend.calls_to(Delegate::Writer)[0].input;
    let positions: Vec<usize> = (1..=5)
        .map(|i| writer_input.find(&format!("### Search {i}: term {i}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let feed_order: Vec<&str> = search_items(&updates)
        .iter()
        .map(|u| u.message.lines().next().unwrap())
        .collect();
    assert_eq!(
        feed_order,
        vec![
            "### Search 1/5: term 1",
            "### Search 2/5: term 2",
            "### Search 3/5: term 3",
            "### Search 4/5: term 4",
            "### Search 5/5: term 5",
        ]
    );
}

#[tokio::test]
async fn test_searches_overlap_up_to_the_concurrency_limit() {
    let backend = Arc::new(ScriptedBackend::new(5).all_delayed(Duration::from_millis(50)));
    let config = PipelineConfig {
        search_concurrency: 3,
        ..pipeline()
    };
    let manager = manager_with(backend.clone(), config, None);

    let updates = run_to_end(&manager, answers()).await;

    assert_eq!(updates.last().unwrap().phase, ResearchPhase::Done);
    assert_eq!(backend.calls_to(Delegate::Searcher).len(), 5);
    let peak = backend.peak_searches();
    assert!(peak > 1, "searches ran one at a time");
    assert!(peak <= 3, "{peak} searches in flight with a limit of 3");
}

// =============================================================================
// DEGRADED AND FAILED SESSIONS
// =============================================================================
#[tokio::test]
async fn test_single_failed_search_still_produces_report() {
    let backend = Arc::new(ScriptedBackend::new(5).failing("term 3"));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let updates = run_to_end(&manager, answers()).await;

    let last = updates.last().unwrap();
    assert_eq!(last.phase, ResearchPhase::Done);

    let searches = search_items(&updates);
    assert_eq!(searches.len(), 5);
    assert!(searches[2].message.starts_with("### Search 3/5 [failed]: term 3"));
    assert!(searches[2].message.contains("Search failed for 'term 3'"));
    assert!(!searches[1].message.contains("[failed]"));

    let writer_input = &backend.calls_to(Delegate::Writer)[0].input;
    assert!(writer_input.contains("### Search 3 (FAILED): term 3"));
    assert!(writer_input.contains("Summary of term 5"));
}

#[tokio::test]
async fn test_budget_exceeded_fails_without_report() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let config = PipelineConfig {
        max_invocations: 2,
        ..pipeline()
    };
    let manager = manager_with(backend.clone(), config, None);

    let updates = run_to_end(&manager, answers()).await;

    let last = updates.last().unwrap();
    assert_eq!(last.phase, ResearchPhase::Failed);
    assert!(last.message.starts_with("Error during research: Invocation budget exceeded"));
    assert!(updates.iter().all(|u| !u.message.contains("Research Complete")));

    // Summarizer and planner ran; the search batch was refused.
    assert_eq!(backend.calls_to(Delegate::Searcher).len(), 0);
    assert_eq!(backend.calls_to(Delegate::Writer).len(), 0);
}

#[tokio::test]
async fn test_short_plan_fails_session() {
    let backend = Arc::new(ScriptedBackend::new(3));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let updates = run_to_end(&manager, answers()).await;

    let last = updates.last().unwrap();
    assert_eq!(last.phase, ResearchPhase::Failed);
    assert!(last.message.contains("Planner failed"));
    assert!(last.message.contains("expected 5 searches, got 3"));
    assert_eq!(backend.calls_to(Delegate::Searcher).len(), 0);
}

#[tokio::test]
async fn test_stalled_planner_times_out_the_session() {
    let backend = Arc::new(
        ScriptedBackend::new(5).stalling(Delegate::Planner, Duration::from_secs(5)),
    );
    let config = PipelineConfig {
        delegate_timeout: Duration::from_millis(100),
        ..pipeline()
    };
    let manager = manager_with(backend.clone(), config, None);

    let updates = run_to_end(&manager, answers()).await;

    let last = updates.last().unwrap();
    assert_eq!(last.phase, ResearchPhase::Failed);
    assert!(last.message.starts_with("Error during research: Planner failed"));
    assert!(last.message.contains("timed out"));
    assert_eq!(backend.calls_to(Delegate::Searcher).len(), 0);
    assert_eq!(backend.calls_to(Delegate::Writer).len(), 0);
}

#[tokio::test]
async fn test_missing_answer_is_rejected_before_any_call() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let updates = run_to_end(&manager, ClarificationAnswers::new("overview", "", "briefing")).await;

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].phase, ResearchPhase::Failed);
    assert_eq!(
        updates[0].message,
        "Please provide answers to all clarification questions."
    );
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_dropping_the_feed_stops_the_session() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let manager = manager_with(backend.clone(), pipeline(), None);

    let first_two: Vec<ProgressUpdate> = manager.run(QUERY, answers()).take(2).collect().await;

    assert_eq!(first_two[1].message, "Creating refined research query...");
    assert_eq!(backend.total_calls(), 0);
}

// =============================================================================
// EMAIL
// =============================================================================
#[tokio::test]
async fn test_email_sent_after_report() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let mailer = Arc::new(RecordingMailer::new(false));
    let emailer = Emailer::new(mailer.clone(), "research@example.com", "me@example.com");
    let manager = manager_with(backend, pipeline(), Some(emailer));

    let updates = run_to_end(&manager, answers()).await;

    assert!(updates.iter().any(|u| u.message == "Email sent successfully!"));
    assert_eq!(updates.last().unwrap().phase, ResearchPhase::Done);

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Remote Work and Urban Housing");
    assert_eq!(sent[0].content_type, "text/html");
    assert!(sent[0].body.contains("<h1>Remote Work and Urban Housing</h1>"));
}

#[tokio::test]
async fn test_email_failure_keeps_report() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let mailer = Arc::new(RecordingMailer::new(true));
    let emailer = Emailer::new(mailer, "research@example.com", "me@example.com");
    let manager = manager_with(backend, pipeline(), Some(emailer));

    let updates = run_to_end(&manager, answers()).await;

    let last = updates.last().unwrap();
    assert_eq!(last.phase, ResearchPhase::Done);
    assert!(last.message.contains("# Remote Work and Urban Housing"));
    assert!(last.message.contains("### Search 5: term 5"));
    assert!(last.message.contains("the report was not e-mailed"));
    assert!(last.message.contains("mail relay down"));

    assert!(updates
        .iter()
        .any(|u| u.phase == ResearchPhase::Emailing && u.message.starts_with("Email could not be sent")));
}
