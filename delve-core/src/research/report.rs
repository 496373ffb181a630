//! Final report synthesis.

use crate::completion::{ResponseKind, StructuredCompletion, string_field};
use crate::prompts;
use crate::types::Message;
use std::sync::Arc;
use tracing::{info, warn};

/// Learnings per findings section in the fallback report.
pub const FINDINGS_PER_SECTION: usize = 10;

const QUERY_PREFIX: &str = "Initial Query:";

/// Writes the plain-text report with a trailing `SOURCES` section.
pub struct ReportWriter {
    completion: Arc<StructuredCompletion>,
    token_limit: usize,
}

impl ReportWriter {
    pub fn new(completion: Arc<StructuredCompletion>, token_limit: usize) -> Self {
        Self {
            completion,
            token_limit,
        }
    }

    /// Write the report. The result is never empty and always lists every URL.
    pub async fn write(&self, original_prompt: &str, learnings: &[String], urls: &[String]) -> String {
        let body = match self.generate(original_prompt, learnings).await {
            Some(body) => body,
            None => {
                info!(
                    learnings = learnings.len(),
                    urls = urls.len(),
                    "Writing fallback report"
                );
                fallback_report(original_prompt, learnings, urls)
            }
        };
        let report = format!("{}{}", body.trim_end(), sources_section(urls));
        info!(chars = report.len(), sources = urls.len(), "Report written");
        report
    }

    async fn generate(&self, original_prompt: &str, learnings: &[String]) -> Option<String> {
        let learnings_text: String = learnings
            .iter()
            .map(|l| format!("<learning>\n{l}\n</learning>"))
            .collect::<Vec<_>>()
            .join("\n");
        let learnings_text = self
            .completion
            .token_counter()
            .trim_to_tokens(&learnings_text, self.token_limit);

        let messages = vec![
            Message::system(prompts::system_prompt()),
            Message::user(prompts::report_prompt(original_prompt, &learnings_text)),
        ];
        match self.completion.call(messages, ResponseKind::Report).await {
            Ok(map) => {
                let text = string_field(&map, "reportText")
                    .or_else(|| string_field(&map, "reportMarkdown"));
                if text.is_none() {
                    warn!("Report response had no report text");
                }
                text
            }
            Err(e) => {
                warn!(error = %e, "Report generation failed");
                None
            }
        }
    }
}

/// `SOURCES` section with one `- url` line per visited URL.
pub fn sources_section(urls: &[String]) -> String {
    let mut section = String::from("\n\nSOURCES\n\n");
    section.push_str(
        &urls
            .iter()
            .map(|url| format!("- {url}"))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    section
}

/// Research topic from the first line of the prompt, without the query label.
pub fn research_topic(original_prompt: &str) -> String {
    let first_line = original_prompt.trim().lines().next().unwrap_or_default();
    let topic = first_line
        .trim()
        .strip_prefix(QUERY_PREFIX)
        .unwrap_or(first_line)
        .trim();
    if topic.is_empty() {
        "the requested topic".to_string()
    } else {
        topic.to_string()
    }
}

/// Deterministic report built only from what the session collected.
pub fn fallback_report(original_prompt: &str, learnings: &[String], urls: &[String]) -> String {
    let topic = research_topic(original_prompt);
    let mut report = format!("RESEARCH REPORT: {topic}\n\nEXECUTIVE SUMMARY\n\n");
    report.push_str(&format!(
        "This report compiles {} findings on {topic} gathered from {} sources. \
         Automated synthesis was unavailable, so the findings are listed as collected, \
         in order of discovery.\n\n",
        learnings.len(),
        urls.len()
    ));

    report.push_str("KEY FINDINGS\n");
    if learnings.is_empty() {
        report.push_str("\nNo findings were collected during this session.\n");
    }
    for (index, chunk) in learnings.chunks(FINDINGS_PER_SECTION).enumerate() {
        let first = index * FINDINGS_PER_SECTION + 1;
        let last = first + chunk.len() - 1;
        report.push_str(&format!("\nFindings {first}-{last}\n\n"));
        for learning in chunk {
            report.push_str(&format!("- {learning}\n"));
        }
    }

    report.push_str("\nCONCLUSIONS\n\n");
    if learnings.is_empty() {
        report.push_str(&format!(
            "The session did not produce usable findings on {topic}. \
             Consider broadening the query or increasing the research depth.\n"
        ));
    } else {
        report.push_str(&format!(
            "The {} findings above summarize the evidence collected on {topic}. \
             Consult the sources below to verify specific figures before relying on them.\n",
            learnings.len()
        ));
    }
    report
}
