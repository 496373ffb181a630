//! Progress hooks for a running research session.

use crate::research::evaluator::GoalEvaluation;
use crate::research::goal::ResearchGoal;
use crate::research::planner::PlannedQuery;
use crate::research::state::{EpochOutcome, QueryOutcome};

/// Callback trait for progressive research UI updates.
///
/// Every hook has an empty default, so implementors override only what they
/// display. `on_query_complete` may be called from concurrent pipelines.
pub trait ResearchObserver: Send + Sync {
    /// Called once the research goal is built.
    fn on_goal(&self, _goal: &ResearchGoal) {}
    /// Called when an epoch starts, with the context passed to the planner.
    fn on_epoch_start(&self, _epoch: usize, _max_epochs: usize, _context: &str) {}
    /// Called with the epoch's planned queries in rank order.
    fn on_queries_planned(&self, _epoch: usize, _queries: &[PlannedQuery]) {}
    /// Called when one query's retrieval and extraction finishes.
    fn on_query_complete(&self, _epoch: usize, _outcome: &QueryOutcome) {}
    /// Called after the end-of-epoch evaluation.
    fn on_epoch_complete(
        &self,
        _epoch: usize,
        _outcome: &EpochOutcome,
        _evaluation: &GoalEvaluation,
    ) {
    }
}

/// No-op observer for tests and headless runs.
pub struct NoOpObserver;

impl ResearchObserver for NoOpObserver {}
