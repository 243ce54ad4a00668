//! # Configuration Module
//!
//! Loads the research pipeline's settings from environment variables
//! (and a `.env` file, if present). Three groups of settings live here:
//! - which provider and which model each delegate uses
//! - the pipeline limits (search count, invocation budget, concurrency)
//! - where the finished report is mailed

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// PROVIDER
// =============================================================================
/// The hosted or local LLM service behind every delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => anyhow::bail!("LLM_PROVIDER must be 'openai' or 'ollama', got: {}", other),
        }
    }
}

// =============================================================================
// MODEL SELECTION
// =============================================================================
/// Model identifier per delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub clarifier: String,
    pub summarizer: String,
    pub planner: String,
    pub searcher: String,
    pub writer: String,
}

impl ModelConfig {
    /// Use the same model for every delegate.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            clarifier: model.clone(),
            summarizer: model.clone(),
            planner: model.clone(),
            searcher: model.clone(),
            writer: model,
        }
    }

    fn all(&self) -> [&str; 5] {
        [
            &self.clarifier,
            &self.summarizer,
            &self.planner,
            &self.searcher,
            &self.writer,
        ]
    }
}

// =============================================================================
// PIPELINE LIMITS
// =============================================================================
/// Limits the orchestrator enforces on one research session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of searches the planner must produce (N)
    pub search_count: usize,

    /// Ceiling on delegate invocations per session. A batch of searches
    /// counts as one invocation.
    pub max_invocations: usize,

    /// How many searches run at the same time
    pub search_concurrency: usize,

    /// Attempts per search before it degrades
    pub search_attempts: u32,

    /// Upper bound on a single delegate call
    pub delegate_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_count: 5,
            max_invocations: 6,
            search_concurrency: 3,
            search_attempts: 2,
            delegate_timeout: Duration::from_secs(120),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.search_count == 0 {
            anyhow::bail!("HOW_MANY_SEARCHES must be at least 1");
        }
        // summarize + plan + one search batch + write
        if self.max_invocations < 4 {
            anyhow::bail!(
                "MAX_INVOCATIONS must be at least 4 to complete a session, got: {}",
                self.max_invocations
            );
        }
        if self.search_concurrency == 0 {
            anyhow::bail!("SEARCH_CONCURRENCY must be at least 1");
        }
        if self.search_attempts == 0 {
            anyhow::bail!("SEARCH_ATTEMPTS must be at least 1");
        }
        if self.delegate_timeout.is_zero() {
            anyhow::bail!("DELEGATE_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

// =============================================================================
// EMAIL
// =============================================================================
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmailConfig {
    /// SendGrid API key; e-mail is skipped when absent
    pub api_key: Option<String>,
    pub from: String,
    pub to: String,
}

impl EmailConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the research pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,

    /// Required when `provider` is OpenAI
    pub openai_api_key: Option<String>,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    pub models: ModelConfig,

    /// Temperature for LLM responses (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum number of web results a single search tool call returns
    pub max_search_results: usize,

    pub pipeline: PipelineConfig,

    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            openai_api_key: None,
            ollama_host: "http://localhost:11434".to_string(),
            models: ModelConfig::uniform("gpt-4o-mini"),
            temperature: 0.7,
            max_search_results: 5,
            pipeline: PipelineConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// `RESEARCH_MODEL` sets the model of every delegate; the
    /// `<DELEGATE>_MODEL` variables then override single delegates.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("LLM_PROVIDER") {
            config.provider = val.parse()?;
        }

        config.openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("RESEARCH_MODEL") {
            config.models = ModelConfig::uniform(val);
        }

        // # Rust Concept: Mutable References in Arrays
        // Pairing each variable with `&mut` to its field keeps the override
        // loop free of five copies of the same `if let`.
        let overrides = [
            ("CLARIFIER_MODEL", &mut config.models.clarifier),
            ("SUMMARIZER_MODEL", &mut config.models.summarizer),
            ("PLANNER_MODEL", &mut config.models.planner),
            ("SEARCH_MODEL", &mut config.models.searcher),
            ("WRITER_MODEL", &mut config.models.writer),
        ];
        for (var, field) in overrides {
            if let Ok(val) = env::var(var) {
                *field = val;
            }
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("HOW_MANY_SEARCHES") {
            config.pipeline.search_count = val
                .parse()
                .context("HOW_MANY_SEARCHES must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_INVOCATIONS") {
            config.pipeline.max_invocations = val
                .parse()
                .context("MAX_INVOCATIONS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("SEARCH_CONCURRENCY") {
            config.pipeline.search_concurrency = val
                .parse()
                .context("SEARCH_CONCURRENCY must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("SEARCH_ATTEMPTS") {
            config.pipeline.search_attempts = val
                .parse()
                .context("SEARCH_ATTEMPTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("DELEGATE_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .context("DELEGATE_TIMEOUT_SECS must be a whole number of seconds")?;
            config.pipeline.delegate_timeout = Duration::from_secs(secs);
        }

        config.email.api_key = env::var("SENDGRID_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(val) = env::var("EMAIL_FROM") {
            config.email.from = val;
        }
        if let Ok(val) = env::var("EMAIL_TO") {
            config.email.to = val;
        }

        Ok(config)
    }

    /// Validate the configuration before any delegate is built.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.models.all().iter().any(|m| m.trim().is_empty()) {
            anyhow::bail!("Model names cannot be empty");
        }

        if self.provider == Provider::OpenAi && self.openai_api_key.is_none() {
            anyhow::bail!("OPENAI_API_KEY is required when LLM_PROVIDER is 'openai'");
        }

        if self.email.is_enabled() && (self.email.from.is_empty() || self.email.to.is_empty()) {
            anyhow::bail!("EMAIL_FROM and EMAIL_TO are required when SENDGRID_API_KEY is set");
        }

        self.pipeline.validate()
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            openai_api_key: Some("sk-test".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.models.writer, "gpt-4o-mini");
        assert_eq!(config.pipeline.search_count, 5);
        assert_eq!(config.pipeline.max_invocations, 6);
        assert!(!config.email.is_enabled());
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_openai_requires_key() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = Config {
            provider: Provider::Ollama,
            models: ModelConfig::uniform("llama3.2"),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_temperature() {
        let mut config = valid_config();
        config.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_budget_too_small_for_a_session() {
        let mut config = valid_config();
        config.pipeline.max_invocations = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_email_needs_addresses() {
        let mut config = valid_config();
        config.email.api_key = Some("SG.key".to_string());
        assert!(config.validate().is_err());

        config.email.from = "research@example.com".to_string();
        config.email.to = "me@example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" ollama ".parse::<Provider>().unwrap(), Provider::Ollama);
        assert!("bedrock".parse::<Provider>().is_err());
    }
}
