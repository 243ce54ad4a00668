//! # LLM Module
//!
//! The generation capability shared by all delegates.
//!
//! A request is `{instructions, input, optional schema}`; the answer is
//! free text, or JSON conforming to the schema when one was requested.
//! [`CompletionBackend`] is the seam: [`RigBackend`] talks to a real
//! provider through Rig, tests plug in scripted backends.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::{CompletionModel, Prompt};
use rig::providers::{ollama, openai};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;

use crate::config::{Config, Provider};
use crate::error::GenerationError;
use crate::tools::WebSearchTool;

/// Tool round-trips allowed for a search call: search, maybe retry, answer.
const SEARCH_MAX_TURNS: usize = 3;

// =============================================================================
// DELEGATE IDENTITY
// =============================================================================
/// Which pipeline stage a request comes from. Used for logging and lets
/// test backends answer per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delegate {
    Clarifier,
    Summarizer,
    Planner,
    Searcher,
    Writer,
}

impl Delegate {
    pub fn name(&self) -> &'static str {
        match self {
            Delegate::Clarifier => "Clarifier",
            Delegate::Summarizer => "Summarizer",
            Delegate::Planner => "Planner",
            Delegate::Searcher => "Searcher",
            Delegate::Writer => "Writer",
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// REQUEST
// =============================================================================
/// One call to the generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub delegate: Delegate,
    pub model: String,
    pub instructions: String,
    pub input: String,
    /// JSON Schema the answer must conform to
    pub schema: Option<serde_json::Value>,
    /// Attach the web search tool and let the model call it
    pub web_search: bool,
}

impl GenerationRequest {
    pub fn new(
        delegate: Delegate,
        model: impl Into<String>,
        instructions: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            delegate,
            model: model.into(),
            instructions: instructions.into(),
            input: input.into(),
            schema: None,
            web_search: false,
        }
    }

    /// Request output conforming to `T`'s JSON Schema.
    pub fn with_schema<T: JsonSchema>(mut self) -> Self {
        self.schema = serde_json::to_value(schemars::schema_for!(T)).ok();
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }

    /// System prompt sent to the model: the instructions, followed by the
    /// output schema when structured output was requested.
    pub fn preamble(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}\n\nRespond ONLY with a single JSON object that conforms to this JSON Schema. \
                 Do not wrap it in prose.\n\n{}",
                self.instructions.trim_end(),
                schema
            ),
            None => self.instructions.clone(),
        }
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================
/// The external generation capability.
///
/// # Rust Concept: Trait Objects
///
/// Delegates hold an `Arc<dyn CompletionBackend>`, so they don't care
/// whether the answer comes from OpenAI, Ollama or a test double.
/// `async_trait` makes the async method object-safe.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Run `request` and parse the answer as `T`.
pub async fn generate_structured<T>(
    backend: &dyn CompletionBackend,
    request: GenerationRequest,
) -> Result<T, GenerationError>
where
    T: DeserializeOwned + JsonSchema,
{
    let request = request.with_schema::<T>();
    let delegate = request.delegate;
    let text = backend.complete(request).await?;
    debug!(delegate = %delegate, len = text.len(), "Parsing structured output");
    parse_json(&text)
}

/// Parse a JSON object out of model text, tolerating code fences and
/// leading or trailing chatter around the object.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, GenerationError> {
    let trimmed = text.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(GenerationError::Malformed(
                "no JSON object in model output".to_string(),
            ))
        }
    };

    serde_json::from_str(candidate).map_err(|e| GenerationError::Malformed(e.to_string()))
}

// =============================================================================
// RIG BACKEND
// =============================================================================
/// Provider client, created once per process.
enum ProviderHandle {
    OpenAi(openai::Client),
    Ollama(ollama::Client),
}

/// [`CompletionBackend`] backed by a Rig provider client.
///
/// Each request builds a short-lived Rig agent from the shared client: the
/// preamble carries the delegate's instructions (and schema), and the web
/// search tool is attached only for searcher requests.
pub struct RigBackend {
    handle: ProviderHandle,
    search_tool: WebSearchTool,
    temperature: f64,
}

impl RigBackend {
    /// Build the provider client selected in `config`.
    ///
    /// The Rig clients read their credentials from the environment, which
    /// `Config::from_env` has already populated from `.env`.
    pub fn from_config(config: &Config, search_tool: WebSearchTool) -> Self {
        let handle = match config.provider {
            Provider::OpenAi => ProviderHandle::OpenAi(openai::Client::from_env()),
            Provider::Ollama => {
                std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
                ProviderHandle::Ollama(ollama::Client::from_env())
            }
        };

        Self {
            handle,
            search_tool,
            temperature: f64::from(config.temperature),
        }
    }

    async fn run_agent<M>(
        &self,
        builder: AgentBuilder<M>,
        request: &GenerationRequest,
    ) -> Result<String, GenerationError>
    where
        M: CompletionModel + 'static,
    {
        let builder = builder
            .preamble(&request.preamble())
            .temperature(self.temperature);

        let result = if request.web_search {
            builder
                .tool(self.search_tool.clone())
                .build()
                .prompt(request.input.as_str())
                .multi_turn(SEARCH_MAX_TURNS)
                .await
        } else {
            builder.build().prompt(request.input.as_str()).await
        };

        result.map_err(|e| GenerationError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CompletionBackend for RigBackend {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            delegate = %request.delegate,
            model = %request.model,
            structured = request.schema.is_some(),
            web_search = request.web_search,
            "Calling model"
        );

        match &self.handle {
            ProviderHandle::OpenAi(client) => {
                self.run_agent(client.agent(&request.model), &request).await
            }
            ProviderHandle::Ollama(client) => {
                self.run_agent(client.agent(&request.model), &request).await
            }
        }
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClarificationQuestions, SearchPlan};

    struct FixedBackend(&'static str);

    #[async_trait]
    impl CompletionBackend for FixedBackend {
        async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            assert!(request.schema.is_some(), "structured calls must carry a schema");
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_preamble_includes_schema() {
        let request = GenerationRequest::new(Delegate::Planner, "m", "Plan searches.", "q")
            .with_schema::<SearchPlan>();
        let preamble = request.preamble();

        assert!(preamble.starts_with("Plan searches."));
        assert!(preamble.contains("JSON Schema"));
        assert!(preamble.contains("searches"));
    }

    #[test]
    fn test_preamble_plain_text() {
        let request = GenerationRequest::new(Delegate::Searcher, "m", "Summarize.", "q");
        assert_eq!(request.preamble(), "Summarize.");
    }

    #[test]
    fn test_parse_json_strips_fences() {
        let text = "```json\n{\"searches\": []}\n```";
        let plan: SearchPlan = parse_json(text).unwrap();
        assert!(plan.searches.is_empty());
    }

    #[test]
    fn test_parse_json_rejects_prose() {
        let result: Result<SearchPlan, _> = parse_json("I could not do that.");
        assert!(matches!(result, Err(GenerationError::Malformed(_))));
    }

    #[test]
    fn test_parse_json_rejects_wrong_shape() {
        let result: Result<ClarificationQuestions, _> = parse_json("{\"question_1\": \"only one\"}");
        assert!(matches!(result, Err(GenerationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_generate_structured() {
        let backend = FixedBackend(
            r#"Here you go: {"question_1": "a?", "question_2": "b?", "question_3": "c?"}"#,
        );
        let request = GenerationRequest::new(Delegate::Clarifier, "m", "Ask.", "q");

        let questions: ClarificationQuestions =
            generate_structured(&backend, request).await.unwrap();

        assert_eq!(questions.question_3, "c?");
    }
}
