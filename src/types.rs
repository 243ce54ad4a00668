//! # Contract Types
//!
//! The records handed from one pipeline stage to the next. The structs a
//! model must produce derive `JsonSchema` so the schema can be sent with
//! the request; everything else is plain data.
//!
//! Nothing here is mutated after construction: each stage builds a new
//! record from the previous one.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CLARIFICATION
// =============================================================================
/// The three clarifying questions asked about a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClarificationQuestions {
    /// First clarifying question about scope or depth
    pub question_1: String,
    /// Second clarifying question about specific aspects
    pub question_2: String,
    /// Third clarifying question about context or purpose
    pub question_3: String,
}

impl ClarificationQuestions {
    pub fn as_array(&self) -> [&str; 3] {
        [&self.question_1, &self.question_2, &self.question_3]
    }

    /// True when every question has visible text.
    pub fn is_complete(&self) -> bool {
        self.as_array().iter().all(|q| !q.trim().is_empty())
    }
}

/// The caller's answers, positionally aligned with [`ClarificationQuestions`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClarificationAnswers {
    answers: [String; 3],
    /// Questions the answers respond to, when the caller still has them.
    questions: Option<[String; 3]>,
}

impl ClarificationAnswers {
    pub fn new(
        answer_1: impl Into<String>,
        answer_2: impl Into<String>,
        answer_3: impl Into<String>,
    ) -> Self {
        Self {
            answers: [answer_1.into(), answer_2.into(), answer_3.into()],
            questions: None,
        }
    }

    /// Attach the questions so the refined query sees both sides.
    pub fn with_questions(mut self, questions: &ClarificationQuestions) -> Self {
        let [q1, q2, q3] = questions.as_array();
        self.questions = Some([q1.to_string(), q2.to_string(), q3.to_string()]);
        self
    }

    pub fn answers(&self) -> &[String; 3] {
        &self.answers
    }

    pub fn is_complete(&self) -> bool {
        self.answers.iter().all(|a| !a.trim().is_empty())
    }

    /// Render the answers as the block the summarizer reads.
    ///
    /// ```text
    /// Question 1: How deep should this go?
    /// Question 1 Response: Policy level overview
    /// ```
    pub fn to_prompt_block(&self) -> String {
        self.answers
            .iter()
            .enumerate()
            .map(|(i, answer)| {
                let n = i + 1;
                match &self.questions {
                    Some(questions) => format!(
                        "Question {n}: {}\nQuestion {n} Response: {}",
                        questions[i].trim(),
                        answer.trim()
                    ),
                    None => format!("Question {n} Response: {}", answer.trim()),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// REFINED QUERY
// =============================================================================
/// The query after the user's clarifications were folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RefinedQuery {
    /// The user's original query
    pub original_query: String,
    /// Summary of the user's responses to clarification questions
    pub clarifications: String,
    /// A refined, more specific query for research
    pub refined_query: String,
    /// Concrete topics the research should focus on
    pub research_focus: Vec<String>,
}

// =============================================================================
// SEARCH PLAN
// =============================================================================
/// One planned web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchTask {
    /// Your reasoning for why this search is important to the query
    pub reason: String,
    /// The search term to use for the web search
    pub query: String,
}

/// The planner's raw output, before the orchestrator checks its size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPlan {
    /// A list of web searches to perform to best answer the query
    pub searches: Vec<SearchTask>,
}

/// Whether a search produced a real summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Completed,
    /// The search failed; the summary explains why.
    Degraded,
}

/// The summary produced for one [`SearchTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub reason: String,
    pub summary: String,
    pub status: SearchStatus,
}

impl SearchResult {
    pub fn completed(task: &SearchTask, summary: impl Into<String>) -> Self {
        Self {
            query: task.query.clone(),
            reason: task.reason.clone(),
            summary: summary.into(),
            status: SearchStatus::Completed,
        }
    }

    pub fn degraded(task: &SearchTask, error: impl fmt::Display) -> Self {
        Self {
            query: task.query.clone(),
            reason: task.reason.clone(),
            summary: format!("Search failed for '{}': {}", task.query, error),
            status: SearchStatus::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == SearchStatus::Degraded
    }
}

// =============================================================================
// REPORT
// =============================================================================
/// The writer's final output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    /// A short 2-3 sentence summary of the findings
    pub short_summary: String,
    /// The final comprehensive report in markdown format
    pub markdown_report: String,
    /// Suggested topics to research further
    pub follow_up_questions: Vec<String>,
}

impl Report {
    /// The report as shown to the caller: body plus follow-up topics.
    pub fn to_markdown(&self) -> String {
        let mut out = self.markdown_report.trim_end().to_string();
        if !self.follow_up_questions.is_empty() {
            out.push_str("\n\n## Suggested follow-up research\n\n");
            for question in &self.follow_up_questions {
                out.push_str("- ");
                out.push_str(question.trim());
                out.push('\n');
            }
        }
        out
    }
}

// =============================================================================
// EMAIL OUTCOME
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Success,
    Error,
}

/// What happened when the report was mailed. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDispatchOutcome {
    pub status: DispatchStatus,
    pub message: String,
}

impl EmailDispatchOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }
}
