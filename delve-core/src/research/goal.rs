//! Research goal construction from the initial query and clarifying Q&A.

use crate::completion::{ResponseKind, StructuredCompletion, string_field, string_list};
use crate::prompts;
use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const FALLBACK_CRITERION: &str = "Find comprehensive and authoritative information";
const FALLBACK_QUESTION: &str = "What are the key findings and latest developments?";

/// The measurable target of a research session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchGoal {
    pub primary_objective: String,
    pub success_criteria: Vec<String>,
    pub specific_questions: Vec<String>,
}

impl ResearchGoal {
    /// Minimal goal used when the model cannot produce one.
    pub fn fallback(initial_query: &str) -> Self {
        Self {
            primary_objective: initial_query.to_string(),
            success_criteria: vec![FALLBACK_CRITERION.to_string()],
            specific_questions: vec![FALLBACK_QUESTION.to_string()],
        }
    }
}

/// Pair each question with the answer at the same index.
///
/// Extra questions or answers beyond the shorter list are dropped.
pub fn pair_questions(questions: &[String], answers: &[String]) -> Vec<(String, String)> {
    if questions.len() != answers.len() {
        warn!(
            questions = questions.len(),
            answers = answers.len(),
            "Follow-up question and answer counts differ; pairing up to the shorter list"
        );
    }
    questions
        .iter()
        .zip(answers)
        .map(|(q, a)| (q.clone(), a.clone()))
        .collect()
}

/// Builds a [`ResearchGoal`] with one structured completion.
pub struct GoalBuilder {
    completion: Arc<StructuredCompletion>,
}

impl GoalBuilder {
    pub fn new(completion: Arc<StructuredCompletion>) -> Self {
        Self { completion }
    }

    /// Build the goal. Falls back to [`ResearchGoal::fallback`] on any failure
    /// or when the model returns no primary objective.
    pub async fn build(
        &self,
        initial_query: &str,
        questions: &[String],
        answers: &[String],
    ) -> ResearchGoal {
        let qa_text = pair_questions(questions, answers)
            .iter()
            .map(|(q, a)| format!("Q: {q}\nA: {a}"))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            Message::system(prompts::system_prompt()),
            Message::user(prompts::goal_prompt(initial_query, &qa_text)),
        ];

        let map = match self.completion.call(messages, ResponseKind::Goal).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Goal generation failed, using fallback goal");
                return ResearchGoal::fallback(initial_query);
            }
        };

        let Some(primary_objective) = string_field(&map, "primary_objective") else {
            warn!("Goal response had no primary objective, using fallback goal");
            return ResearchGoal::fallback(initial_query);
        };

        let goal = ResearchGoal {
            primary_objective,
            success_criteria: string_list(&map, "success_criteria"),
            specific_questions: string_list(&map, "specific_questions"),
        };
        info!(
            objective = %goal.primary_objective,
            criteria = goal.success_criteria.len(),
            questions = goal.specific_questions.len(),
            "Research goal built"
        );
        goal
    }
}
