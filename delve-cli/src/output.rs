//! Report file persistence.

use chrono::{DateTime, Local};
use delve_core::research::ResearchResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SEPARATOR_WIDTH: usize = 50;

/// `output_<YYYYmmdd_HHMMSS>.txt` for the given time.
pub fn report_filename(at: &DateTime<Local>) -> String {
    format!("output_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// URL count per host, most visited first, ties by name.
///
/// URLs that do not parse or have no host count under `unknown`.
pub fn domain_breakdown(urls: &[String]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for raw in urls {
        let domain = url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        *counts.entry(domain).or_default() += 1;
    }
    let mut breakdown: Vec<(String, usize)> = counts.into_iter().collect();
    breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    breakdown
}

/// Human-readable duration such as `3m 07s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s:02}s"),
        (h, m, s) => format!("{h}h {m:02}m {s:02}s"),
    }
}

/// Full file contents: metadata header, domain breakdown, then the report.
pub fn render_report_file(
    result: &ResearchResult,
    report: &str,
    started: &DateTime<Local>,
    duration: Duration,
) -> String {
    let domains = domain_breakdown(&result.visited_urls);
    let mut out = String::from("RESEARCH REPORT\n\n");
    out.push_str(&format!(
        "Research Date: {}\n",
        started.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Research Duration: {}\n", format_duration(duration)));
    out.push_str(&format!(
        "Goal Achievement Score: {:.2}/1.0\n",
        result.goal_alignment_score
    ));
    out.push_str(&format!("Goal Achieved: {}\n", result.goal_achieved));
    out.push_str(&format!("Epochs Completed: {}\n", result.epochs_completed));
    out.push_str(&format!("Total Learnings: {}\n", result.learnings.len()));
    out.push_str(&format!("Total Sources: {}\n", result.visited_urls.len()));
    out.push_str(&format!("Unique Domains: {}\n\n", domains.len()));

    out.push_str("DOMAIN BREAKDOWN\n\n");
    for (domain, count) in &domains {
        let noun = if *count == 1 { "URL" } else { "URLs" };
        out.push_str(&format!("- {domain}: {count} {noun}\n"));
    }
    out.push('\n');
    out.push_str(&"=".repeat(SEPARATOR_WIDTH));
    out.push_str("\n\n");
    out.push_str(report);
    if !report.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Write the report file into `dir`, creating it if needed.
pub fn save_report(dir: &Path, started: &DateTime<Local>, contents: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_filename(started));
    std::fs::write(&path, contents)?;
    Ok(path)
}
