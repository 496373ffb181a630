//! Goal-driven iterative research.
//!
//! A session runs in bounded epochs:
//! 1. **Goal**: turn the query and clarifying answers into success criteria
//! 2. **Plan**: generate ranked search queries for the current gaps
//! 3. **Retrieve**: search and scrape concurrently, extract learnings one call at a time
//! 4. **Evaluate**: score alignment and decide whether to continue
//!
//! The [`ReportWriter`] turns the final learnings into a plain-text report.

pub mod controller;
pub mod evaluator;
pub mod extractor;
pub mod feedback;
pub mod goal;
pub mod observer;
pub mod planner;
pub mod report;
pub mod state;

pub use controller::{ControllerPhase, ResearchController, ResearchParams};
pub use evaluator::{GoalEvaluation, GoalEvaluator};
pub use extractor::{Extraction, LearningExtractor};
pub use feedback::FollowUpGenerator;
pub use goal::{GoalBuilder, ResearchGoal};
pub use observer::{NoOpObserver, ResearchObserver};
pub use planner::{PlannedQuery, QueryPlanner};
pub use report::ReportWriter;
pub use state::{EpochOutcome, QueryOutcome, ResearchResult, ResearchState};

/// Combine the initial query and clarifying Q&A into the report prompt.
pub fn combined_prompt(initial_query: &str, questions: &[String], answers: &[String]) -> String {
    let mut prompt = format!("Initial Query: {initial_query}");
    for (q, a) in goal::pair_questions(questions, answers) {
        prompt.push_str(&format!("\nFollow-up Question: {q}\nAnswer: {a}"));
    }
    prompt
}
