//! Property-based tests for the research loop's pure pieces using proptest.

use proptest::prelude::*;

use delve_core::brain::MockLlmProvider;
use delve_core::completion::{JsonMap, StructuredCompletion};
use delve_core::config::{MAX_EPOCHS, RetryConfig, clamp_epochs};
use delve_core::research::evaluator::{ACHIEVEMENT_THRESHOLD, coverage, meets_threshold};
use delve_core::research::state::dedup_preserving_order;
use delve_core::research::{GoalEvaluation, QueryPlanner, ResearchGoal};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

// --- Deduplication properties ---

proptest! {
    #[test]
    fn dedup_is_idempotent(items in prop::collection::vec("[a-e]{1,2}", 0..40)) {
        let once = dedup_preserving_order(&items);
        let twice = dedup_preserving_order(&once);
        prop_assert_eq!(&once, &twice);
    }

    #[test]
    fn dedup_keeps_every_distinct_item_once(items in prop::collection::vec("[a-e]{1,2}", 0..40)) {
        let deduped = dedup_preserving_order(&items);
        let distinct: HashSet<&String> = items.iter().collect();
        prop_assert_eq!(deduped.len(), distinct.len());
        for item in &items {
            prop_assert!(deduped.contains(item));
        }
    }

    #[test]
    fn dedup_preserves_first_occurrence_order(items in prop::collection::vec(0u8..10, 0..40)) {
        let deduped = dedup_preserving_order(&items);
        let first_index = |x: &u8| items.iter().position(|i| i == x).unwrap_or(usize::MAX);
        for pair in deduped.windows(2) {
            prop_assert!(first_index(&pair[0]) < first_index(&pair[1]));
        }
    }
}

// --- Epoch bound ---

proptest! {
    #[test]
    fn epochs_always_within_bounds(depth in any::<usize>()) {
        let epochs = clamp_epochs(depth);
        prop_assert!((1..=MAX_EPOCHS).contains(&epochs));
        if (1..=MAX_EPOCHS).contains(&depth) {
            prop_assert_eq!(epochs, depth);
        }
    }
}

// --- Goal achievement invariant ---

fn goal(criteria: usize, questions: usize) -> ResearchGoal {
    ResearchGoal {
        primary_objective: "objective".to_string(),
        success_criteria: (0..criteria).map(|i| format!("criterion {i}")).collect(),
        specific_questions: (0..questions).map(|i| format!("question {i}")).collect(),
    }
}

fn response(score: f64, met: usize, answered: usize, claimed: bool) -> JsonMap {
    let value = json!({
        "alignment_score": score,
        "criteria_met": (0..met).map(|i| format!("Criterion {i}")).collect::<Vec<_>>(),
        "questions_answered": (0..answered).map(|i| format!("QUESTION {i}")).collect::<Vec<_>>(),
        "goal_achieved": claimed,
    });
    value.as_object().cloned().unwrap_or_default()
}

proptest! {
    #[test]
    fn goal_achieved_implies_thresholds(
        score in 0.0f64..=1.0,
        criteria in 0usize..6,
        questions in 0usize..6,
        met_seed in 0usize..6,
        answered_seed in 0usize..6,
        claimed in any::<bool>(),
    ) {
        let met = met_seed.min(criteria);
        let answered = answered_seed.min(questions);
        let goal = goal(criteria, questions);
        let evaluation = GoalEvaluation::from_response(&response(score, met, answered, claimed), &goal)
            .expect("score present");

        prop_assert_eq!(evaluation.criteria_met.len(), met);
        prop_assert_eq!(evaluation.questions_answered.len(), answered);
        if evaluation.goal_achieved {
            prop_assert!(claimed);
            prop_assert!(evaluation.alignment_score >= ACHIEVEMENT_THRESHOLD);
            prop_assert!(coverage(met, criteria) >= ACHIEVEMENT_THRESHOLD);
            prop_assert!(coverage(answered, questions) >= ACHIEVEMENT_THRESHOLD);
        }
        prop_assert_eq!(
            evaluation.goal_achieved,
            claimed && meets_threshold(score, met, criteria, answered, questions)
        );
    }

    #[test]
    fn claims_outside_the_goal_never_count(extra in prop::collection::vec("[x-z]{3,6}", 1..5)) {
        let goal = goal(2, 2);
        let value = json!({
            "alignment_score": 1.0,
            "criteria_met": extra.clone(),
            "questions_answered": extra,
            "goal_achieved": true,
        });
        let map = value.as_object().cloned().unwrap_or_default();
        let evaluation = GoalEvaluation::from_response(&map, &goal).expect("score present");
        prop_assert!(evaluation.criteria_met.is_empty());
        prop_assert!(!evaluation.goal_achieved);
    }
}

// --- Planner fallback ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn failed_planning_falls_back_to_context(
        context in "[a-z]{1,12}( [a-z]{1,12}){0,4}",
        breadth in 1usize..8,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let planned = runtime.block_on(async {
            let completion = Arc::new(StructuredCompletion::new(
                Arc::new(MockLlmProvider::failing()),
                RetryConfig { max_retries: 0, ..RetryConfig::default() },
            ));
            QueryPlanner::new(completion).plan(&context, breadth, None).await
        });
        prop_assert_eq!(planned.len(), 1);
        prop_assert_eq!(&planned[0].query, &context);
    }

    #[test]
    fn planned_queries_never_exceed_breadth(breadth in 1usize..6, offered in 0usize..10) {
        let queries: Vec<String> = (0..offered).map(|i| format!("query {i}")).collect();
        let body = json!({ "queries": queries }).to_string();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let planned = runtime.block_on(async {
            let completion = Arc::new(StructuredCompletion::new(
                Arc::new(MockLlmProvider::with_response(&body)),
                RetryConfig { max_retries: 0, ..RetryConfig::default() },
            ));
            QueryPlanner::new(completion).plan("context", breadth, None).await
        });
        prop_assert!(!planned.is_empty());
        prop_assert!(planned.len() <= breadth);
        if offered == 0 {
            prop_assert_eq!(&planned[0].query, "context");
        } else {
            prop_assert_eq!(planned.len(), offered.min(breadth));
        }
    }
}
