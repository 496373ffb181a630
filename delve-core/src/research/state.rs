//! Session accumulators and the terminal research artifact.

use crate::research::evaluator::GoalEvaluation;
use crate::research::goal::ResearchGoal;
use crate::research::planner::PlannedQuery;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// Remove duplicates, keeping the first occurrence of each item in place.
pub fn dedup_preserving_order<T: Eq + Hash + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|item| seen.insert(*item))
        .cloned()
        .collect()
}

/// Result of one planned query's retrieval and extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: PlannedQuery,
    pub urls: Vec<String>,
    pub documents_with_content: usize,
    pub learnings: Vec<String>,
    pub follow_ups: Vec<String>,
    /// Set when retrieval failed; the outcome then contributes nothing.
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn failed(query: PlannedQuery, error: impl Into<String>) -> Self {
        Self {
            query,
            urls: Vec::new(),
            documents_with_content: 0,
            learnings: Vec::new(),
            follow_ups: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Learnings and URLs gathered in one epoch, not deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochOutcome {
    pub learnings: Vec<String>,
    pub urls: Vec<String>,
}

impl EpochOutcome {
    /// Concatenate per-query outcomes in the given order.
    pub fn gather(outcomes: &[QueryOutcome]) -> Self {
        let mut epoch = Self::default();
        for outcome in outcomes {
            epoch.learnings.extend(outcome.learnings.iter().cloned());
            epoch.urls.extend(outcome.urls.iter().cloned());
        }
        epoch
    }
}

/// Session-scoped accumulators owned by the controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchState {
    pub all_learnings: Vec<String>,
    pub all_urls: Vec<String>,
    pub epoch: usize,
}

impl ResearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch's outcome. Duplicates are kept until [`finalize`](Self::finalize).
    pub fn absorb(&mut self, outcome: EpochOutcome) {
        self.all_learnings.extend(outcome.learnings);
        self.all_urls.extend(outcome.urls);
    }

    /// The last `n` accumulated learnings, or `None` when there are none yet.
    pub fn recent_learnings(&self, n: usize) -> Option<&[String]> {
        if self.all_learnings.is_empty() || n == 0 {
            return None;
        }
        let start = self.all_learnings.len().saturating_sub(n);
        Some(&self.all_learnings[start..])
    }

    /// Deduplicated `(learnings, urls)` in first-occurrence order.
    pub fn finalize(self) -> (Vec<String>, Vec<String>) {
        (
            dedup_preserving_order(&self.all_learnings),
            dedup_preserving_order(&self.all_urls),
        )
    }
}

/// The terminal artifact of a research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub goal: ResearchGoal,
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
    pub goal_alignment_score: f64,
    pub epochs_completed: usize,
    pub goal_achieved: bool,
    pub final_evaluation: Option<GoalEvaluation>,
}
