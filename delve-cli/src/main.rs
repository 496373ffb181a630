//! Delve CLI: terminal front end for the goal-driven research agent.
//!
//! Asks clarifying questions, runs research epochs, and saves a plain-text
//! report with its sources.

mod commands;
mod output;
mod progress;
mod session;

use clap::Parser;
use delve_core::config::{DelveConfig, RetrievalBackend};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Delve: goal-driven iterative web research
#[derive(Parser, Debug)]
#[command(name = "delve", version, about, long_about = None)]
struct Cli {
    /// Research topic (prompted for if omitted)
    query: Option<String>,

    /// Search queries per epoch
    #[arg(short, long)]
    breadth: Option<usize>,

    /// Research epochs (clamped to 1-5)
    #[arg(short, long)]
    depth: Option<usize>,

    /// Simultaneous retrieval pipelines
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Answer to a clarifying question, in order (repeatable)
    #[arg(short, long = "answer")]
    answers: Vec<String>,

    /// Skip clarifying questions
    #[arg(long)]
    no_questions: bool,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// LLM provider: openai, deepseek, openrouter, gemini, ollama
    #[arg(long)]
    provider: Option<String>,

    /// Retrieval backend: duckduckgo, serper, serper_only, firecrawl
    #[arg(long)]
    backend: Option<RetrievalBackend>,

    /// Directory for the report file
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Workspace directory (for `.delve/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Do not write the JSON log file
    #[arg(long)]
    no_log_file: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default `.delve/config.toml` in the workspace
    Init,
    /// Print the effective configuration
    Show,
    /// Print where configuration and logs are read from
    Path,
}

impl Cli {
    fn apply_overrides(&self, config: &mut DelveConfig) {
        if let Some(provider) = &self.provider {
            config.llm.set_provider(provider);
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(breadth) = self.breadth {
            config.research.breadth = breadth;
        }
        if let Some(depth) = self.depth {
            config.research.depth = depth;
        }
        if let Some(concurrency) = self.concurrency {
            config.research.concurrency = concurrency;
        }
        if let Some(backend) = self.backend {
            config.retrieval.backend = backend;
        }
        if let Some(dir) = &self.output_dir {
            config.output.report_dir = Some(dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let mut cli = Cli::parse();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(Commands::Config { action }) = cli.command.take() {
        return commands::handle_config(action, &workspace).await;
    }

    let mut config = delve_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn,delve_core=info,delve_tools=info,delve=info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let mut _guard = None;
    let json_layer = if cli.no_log_file {
        None
    } else {
        let log_dir = config
            .output
            .log_dir
            .clone()
            .or_else(delve_core::config::default_log_dir)
            .unwrap_or_else(|| PathBuf::from("logs"));
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "delve.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug")),
        )
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let report_dir = config
        .output
        .report_dir
        .clone()
        .unwrap_or_else(|| workspace.clone());
    let options = session::SessionOptions {
        query: cli.query,
        answers: cli.answers,
        no_questions: cli.no_questions,
        quiet: cli.quiet,
        report_dir,
    };
    session::run(config, options).await
}
