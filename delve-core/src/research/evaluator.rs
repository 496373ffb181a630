//! Goal alignment evaluation.

use crate::completion::{JsonMap, ResponseKind, StructuredCompletion, string_list};
use crate::prompts;
use crate::research::goal::ResearchGoal;
use crate::types::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Minimum score and coverage ratios for a goal to count as achieved.
pub const ACHIEVEMENT_THRESHOLD: f64 = 0.8;

const FALLBACK_SCORE: f64 = 0.5;
const FALLBACK_MISSING: &str = "Unable to evaluate due to processing error";
const FALLBACK_DIRECTION: &str = "Continue general research with broader queries";

/// Fraction of `total` covered by `met`; 1.0 when there is nothing to cover.
pub fn coverage(met: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        met as f64 / total as f64
    }
}

/// Whether a score and coverage counts clear every achievement threshold.
pub fn meets_threshold(
    score: f64,
    criteria_met: usize,
    criteria_total: usize,
    questions_answered: usize,
    questions_total: usize,
) -> bool {
    score >= ACHIEVEMENT_THRESHOLD
        && coverage(criteria_met, criteria_total) >= ACHIEVEMENT_THRESHOLD
        && coverage(questions_answered, questions_total) >= ACHIEVEMENT_THRESHOLD
}

/// One epoch's verdict on how well the learnings satisfy the goal.
///
/// `goal_achieved` is only ever true when [`meets_threshold`] holds for the
/// stored score and the sizes of `criteria_met` and `questions_answered`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluation {
    pub alignment_score: f64,
    pub criteria_met: Vec<String>,
    pub questions_answered: Vec<String>,
    pub missing_aspects: Vec<String>,
    pub goal_achieved: bool,
    pub continue_research: bool,
    pub next_research_directions: Vec<String>,
}

impl GoalEvaluation {
    /// Neutral verdict used when evaluation fails: keep researching.
    pub fn fallback() -> Self {
        Self {
            alignment_score: FALLBACK_SCORE,
            criteria_met: Vec::new(),
            questions_answered: Vec::new(),
            missing_aspects: vec![FALLBACK_MISSING.to_string()],
            goal_achieved: false,
            continue_research: true,
            next_research_directions: vec![FALLBACK_DIRECTION.to_string()],
        }
    }

    /// Build an evaluation from a model response, enforcing the threshold.
    ///
    /// Returns `None` when the response has no usable score. Met criteria and
    /// answered questions are matched case-insensitively against the goal and
    /// stored in the goal's wording; anything else the model lists is dropped.
    pub fn from_response(map: &JsonMap, goal: &ResearchGoal) -> Option<Self> {
        let raw_score = score_value(map.get("alignment_score")?)?;
        let alignment_score = raw_score.clamp(0.0, 1.0);

        let criteria_met = match_claimed(&string_list(map, "criteria_met"), &goal.success_criteria);
        let questions_answered = match_claimed(
            &string_list(map, "questions_answered"),
            &goal.specific_questions,
        );

        let model_says_achieved = map
            .get("goal_achieved")
            .and_then(flag_value)
            .unwrap_or(false);
        let goal_achieved = model_says_achieved
            && meets_threshold(
                alignment_score,
                criteria_met.len(),
                goal.success_criteria.len(),
                questions_answered.len(),
                goal.specific_questions.len(),
            );
        let continue_research = map
            .get("continue_research")
            .and_then(flag_value)
            .unwrap_or(!goal_achieved);

        Some(Self {
            alignment_score,
            criteria_met,
            questions_answered,
            missing_aspects: string_list(map, "missing_aspects"),
            goal_achieved,
            continue_research,
            next_research_directions: string_list(map, "next_research_directions"),
        })
    }

    /// Planning context for the next epoch's queries.
    pub fn planning_context(&self, goal: &ResearchGoal) -> String {
        format!(
            "Primary Goal: {}\nMissing Aspects: {}\nNext Research Directions: {}",
            goal.primary_objective,
            self.missing_aspects.join(", "),
            self.next_research_directions.join(", ")
        )
    }
}

fn score_value(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    // Some models answer in percent.
    Some(if score > 1.0 && score <= 100.0 { score / 100.0 } else { score })
}

fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Keep the items of `reference` that appear in `claimed`, in reference order.
fn match_claimed(claimed: &[String], reference: &[String]) -> Vec<String> {
    let claimed: HashSet<String> = claimed.iter().map(|c| normalize(c)).collect();
    let mut seen = HashSet::new();
    reference
        .iter()
        .filter(|r| claimed.contains(&normalize(r)) && seen.insert(normalize(r)))
        .cloned()
        .collect()
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Scores accumulated learnings against the research goal.
pub struct GoalEvaluator {
    completion: Arc<StructuredCompletion>,
}

impl GoalEvaluator {
    pub fn new(completion: Arc<StructuredCompletion>) -> Self {
        Self { completion }
    }

    /// Evaluate `learnings` after `epoch`. Never fails; see [`GoalEvaluation::fallback`].
    pub async fn evaluate(
        &self,
        goal: &ResearchGoal,
        learnings: &[String],
        epoch: usize,
    ) -> GoalEvaluation {
        let messages = vec![
            Message::system(prompts::system_prompt()),
            Message::user(prompts::evaluation_prompt(
                goal,
                &prompts::bullet_list(learnings),
                epoch,
            )),
        ];

        let evaluation = match self.completion.call(messages, ResponseKind::Evaluation).await {
            Ok(map) => GoalEvaluation::from_response(&map, goal).unwrap_or_else(|| {
                warn!(epoch, "Evaluation response had no alignment score, using fallback");
                GoalEvaluation::fallback()
            }),
            Err(e) => {
                warn!(epoch, error = %e, "Goal evaluation failed, using fallback");
                GoalEvaluation::fallback()
            }
        };

        info!(
            epoch,
            score = evaluation.alignment_score,
            criteria_met = evaluation.criteria_met.len(),
            criteria_total = goal.success_criteria.len(),
            questions_answered = evaluation.questions_answered.len(),
            questions_total = goal.specific_questions.len(),
            achieved = evaluation.goal_achieved,
            "Goal evaluated"
        );
        evaluation
    }
}
