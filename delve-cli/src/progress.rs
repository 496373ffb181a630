//! Console progress lines for a running session.

use delve_core::research::{
    EpochOutcome, GoalEvaluation, PlannedQuery, QueryOutcome, ResearchGoal, ResearchObserver,
};

/// Prints progress to stderr so stdout stays clean for results.
pub struct ConsoleObserver {
    quiet: bool,
}

impl ConsoleObserver {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn say(&self, line: String) {
        if !self.quiet {
            eprintln!("{line}");
        }
    }
}

impl ResearchObserver for ConsoleObserver {
    fn on_goal(&self, goal: &ResearchGoal) {
        self.say(format!("\n  Goal: {}", goal.primary_objective));
        for criterion in &goal.success_criteria {
            self.say(format!("    - {criterion}"));
        }
    }

    fn on_epoch_start(&self, epoch: usize, max_epochs: usize, _context: &str) {
        self.say(format!("\n  Epoch {epoch}/{max_epochs}"));
    }

    fn on_queries_planned(&self, _epoch: usize, queries: &[PlannedQuery]) {
        for (i, q) in queries.iter().enumerate() {
            self.say(format!("    {}. {}", i + 1, q.query));
        }
    }

    fn on_query_complete(&self, _epoch: usize, outcome: &QueryOutcome) {
        let line = match &outcome.error {
            Some(error) => format!("    x {} ({error})", outcome.query.query),
            None => format!(
                "    + {}: {} sources, {} learnings",
                outcome.query.query,
                outcome.urls.len(),
                outcome.learnings.len()
            ),
        };
        self.say(line);
    }

    fn on_epoch_complete(&self, epoch: usize, outcome: &EpochOutcome, evaluation: &GoalEvaluation) {
        self.say(format!(
            "  Epoch {epoch} done: {} learnings, {} sources, alignment {:.2}{}",
            outcome.learnings.len(),
            outcome.urls.len(),
            evaluation.alignment_score,
            if evaluation.goal_achieved {
                " (goal achieved)"
            } else {
                ""
            }
        ));
    }
}
