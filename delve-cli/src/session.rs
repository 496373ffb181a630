//! One research session from the terminal: prompts, research, report file.

use crate::output;
use crate::progress::ConsoleObserver;
use chrono::Local;
use delve_core::completion::StructuredCompletion;
use delve_core::config::DelveConfig;
use delve_core::providers::create_provider;
use delve_core::research::{
    FollowUpGenerator, ReportWriter, ResearchController, ResearchParams, combined_prompt,
};
use dialoguer::Input;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Clarifying questions asked before research.
const MAX_FOLLOW_UP_QUESTIONS: usize = 5;

/// What the command line decided before the session starts.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub query: Option<String>,
    pub answers: Vec<String>,
    pub no_questions: bool,
    pub quiet: bool,
    pub report_dir: PathBuf,
}

/// Run a full session and write the report file.
pub async fn run(mut config: DelveConfig, options: SessionOptions) -> anyhow::Result<()> {
    let interactive = std::io::stdin().is_terminal();

    let query = match options.query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ if interactive => {
            let query: String = Input::new()
                .with_prompt("What would you like to research?")
                .interact_text()?;
            config.research.breadth = Input::new()
                .with_prompt("Research breadth (queries per epoch)")
                .default(config.research.breadth)
                .interact_text()?;
            config.research.depth = Input::new()
                .with_prompt("Research depth (epochs, 1-5)")
                .default(config.research.depth)
                .interact_text()?;
            query.trim().to_string()
        }
        _ => anyhow::bail!("No research query given and stdin is not a terminal"),
    };
    if query.is_empty() {
        anyhow::bail!("Research query is empty");
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let provider = create_provider(&config.llm)?;
    let completion = Arc::new(
        StructuredCompletion::new(provider, config.retry.clone())
            .with_temperature(config.llm.temperature),
    );
    let retrieval = delve_tools::build_retrieval(&config.retrieval)?;

    let (questions, answers) =
        collect_follow_ups(&completion, &query, &options, interactive).await?;

    let started_at = Local::now();
    let timer = Instant::now();
    let params = ResearchParams::from_config(query.clone(), &config.research)
        .with_follow_ups(questions.clone(), answers.clone());
    let controller = ResearchController::new(completion.clone(), retrieval, config.research.clone())
        .with_observer(Arc::new(ConsoleObserver::new(options.quiet)));
    let result = controller.run(params).await;

    println!("\nLearnings:\n");
    for learning in &result.learnings {
        println!("- {learning}");
    }
    println!(
        "\nGoal Achievement Score: {:.2}/1.0 ({} epochs, goal achieved: {})",
        result.goal_alignment_score, result.epochs_completed, result.goal_achieved
    );

    let prompt = combined_prompt(&query, &questions, &answers);
    let report = ReportWriter::new(completion.clone(), config.research.report_token_limit)
        .write(&prompt, &result.learnings, &result.visited_urls)
        .await;
    let duration = timer.elapsed();

    let contents = output::render_report_file(&result, &report, &started_at, duration);
    let path = output::save_report(&options.report_dir, &started_at, &contents)?;
    let usage = completion.usage();
    tracing::info!(
        path = %path.display(),
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        duration_secs = duration.as_secs(),
        "Report saved"
    );
    println!("\nReport saved to {}", path.display());
    Ok(())
}

/// Questions and answers from flags, an interactive prompt, or nothing.
async fn collect_follow_ups(
    completion: &Arc<StructuredCompletion>,
    query: &str,
    options: &SessionOptions,
    interactive: bool,
) -> anyhow::Result<(Vec<String>, Vec<String>)> {
    if options.no_questions || (options.answers.is_empty() && !interactive) {
        return Ok((Vec::new(), Vec::new()));
    }

    let questions = FollowUpGenerator::new(completion.clone())
        .generate(query, MAX_FOLLOW_UP_QUESTIONS)
        .await;

    if !options.answers.is_empty() {
        return Ok((questions, options.answers.clone()));
    }

    println!("\nTo focus the research, please answer a few questions:\n");
    let mut answers = Vec::with_capacity(questions.len());
    for (i, question) in questions.iter().enumerate() {
        let answer: String = Input::new()
            .with_prompt(format!("Q{}: {question}", i + 1))
            .allow_empty(true)
            .interact_text()?;
        answers.push(answer.trim().to_string());
    }
    Ok((questions, answers))
}
