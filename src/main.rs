//! # Deep Research CLI
//!
//! Terminal front-end for the research pipeline:
//! 1. Ask the model for three clarifying questions about the query
//! 2. Collect the answers (from `--answer` flags or interactively)
//! 3. Stream the pipeline's progress and print the final report
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "impact of remote work on urban housing"
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use deep_research::{
    ClarificationAnswers, ClarificationQuestions, Config, ModelConfig, ResearchManager,
    ResearchPhase,
};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "deep-research",
    version,
    about = "Clarify a research question, search the web, and write a report",
    long_about = r#"
Deep Research - clarify, plan, search, write.

The tool will:
  1. Ask you 3 clarifying questions about your query
  2. Refine the query with your answers
  3. Plan and run several web searches concurrently
  4. Write a long-form markdown report (and e-mail it, if configured)

CONFIGURATION (environment or .env):
  LLM_PROVIDER          openai (default) or ollama
  OPENAI_API_KEY        required for openai
  RESEARCH_MODEL        model for every stage (default gpt-4o-mini)
  HOW_MANY_SEARCHES     searches per plan (default 5)
  SENDGRID_API_KEY      enables e-mail, together with EMAIL_FROM / EMAIL_TO

EXAMPLES:
  # Interactive answers
  deep-research "impact of remote work on urban housing"

  # Non-interactive
  deep-research "rust async runtimes" \
      --answer "overview" --answer "tokio vs smol" --answer "picking one for a service"
"#
)]
struct Args {
    /// The research topic or question to investigate
    #[arg(value_name = "QUERY")]
    query: String,

    /// Answer to a clarifying question, in order (give exactly three)
    #[arg(short = 'a', long = "answer", value_name = "ANSWER")]
    answers: Vec<String>,

    /// Model for every stage (overrides RESEARCH_MODEL and the per-stage variables)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Number of web searches to plan (overrides HOW_MANY_SEARCHES)
    #[arg(short = 's', long = "searches")]
    searches: Option<usize>,

    /// Do not e-mail the report even if SendGrid is configured
    #[arg(long = "no-email", default_value = "false")]
    no_email: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;
    apply_cli_overrides(&mut config, &args);
    config.validate()?;

    info!(
        provider = ?config.provider,
        searches = config.pipeline.search_count,
        email = config.email.is_enabled(),
        "Configuration loaded"
    );

    let manager = ResearchManager::from_config(&config)?;

    let questions = manager
        .clarification_questions(&args.query)
        .await
        .context("Could not get clarification questions")?;

    let answers = collect_answers(&questions, args.answers).await?;

    let mut feed = std::pin::pin!(manager.run(&args.query, answers));
    let mut failed = false;
    while let Some(update) = feed.next().await {
        if update.phase == ResearchPhase::Failed {
            failed = true;
        }
        if update.phase.is_terminal() {
            println!("\n{}\n{}\n{}", "=".repeat(60), update, "=".repeat(60));
        } else {
            println!("{}", update);
        }
    }

    if failed {
        error!("Research failed");
        anyhow::bail!("research session failed");
    }

    info!("Research completed successfully");
    Ok(())
}

/// Flags given on the command line win over the environment.
fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(model) = &args.model {
        info!(model = %model, "Using model from command line");
        config.models = ModelConfig::uniform(model.clone());
    }
    if let Some(searches) = args.searches {
        config.pipeline.search_count = searches;
    }
    if args.no_email {
        config.email.api_key = None;
    }
}

/// Use the answers from the command line, or ask for them on stdin.
async fn collect_answers(
    questions: &ClarificationQuestions,
    given: Vec<String>,
) -> Result<ClarificationAnswers> {
    let answers = if given.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut answers = Vec::with_capacity(3);
        for (i, question) in questions.as_array().iter().enumerate() {
            println!("\nQuestion {}: {}", i + 1, question);
            print!("> ");
            std::io::Write::flush(&mut std::io::stdout())?;
            let line = lines
                .next_line()
                .await?
                .context("stdin closed before all questions were answered")?;
            answers.push(line);
        }
        answers
    } else {
        for (i, question) in questions.as_array().iter().enumerate() {
            println!("Question {}: {}", i + 1, question);
        }
        given
    };

    let [a1, a2, a3]: [String; 3] = answers
        .try_into()
        .map_err(|v: Vec<String>| anyhow::anyhow!("expected 3 answers, got {}", v.len()))?;

    Ok(ClarificationAnswers::new(a1, a2, a3).with_questions(questions))
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Logs go to stderr so the feed on stdout stays clean. `RUST_LOG` wins
/// over `--verbose` when set.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
