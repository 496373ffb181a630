//! Search query planning.

use crate::completion::{ResponseKind, StructuredCompletion};
use crate::prompts;
use crate::types::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Rationale attached to the fallback query.
pub const FALLBACK_RESEARCH_GOAL: &str = "general";

/// One search slot within an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub query: String,
    pub research_goal: String,
}

impl PlannedQuery {
    pub fn new(query: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_goal: research_goal.into(),
        }
    }

    /// Accepts `{"query": .., "research_goal": ..}` (or `researchGoal`) or a bare string.
    fn from_value(value: &Value) -> Option<Self> {
        let (query, goal) = match value {
            Value::String(s) => (s.as_str(), ""),
            Value::Object(obj) => (
                obj.get("query")?.as_str()?,
                obj.get("research_goal")
                    .or_else(|| obj.get("researchGoal"))
                    .and_then(|g| g.as_str())
                    .unwrap_or(""),
            ),
            _ => return None,
        };
        let query = query.trim();
        (!query.is_empty()).then(|| Self::new(query, goal.trim()))
    }
}

/// Generates ranked search queries for a planning context.
pub struct QueryPlanner {
    completion: Arc<StructuredCompletion>,
}

impl QueryPlanner {
    pub fn new(completion: Arc<StructuredCompletion>) -> Self {
        Self { completion }
    }

    /// Plan at most `target_count` queries, in the model's rank order.
    ///
    /// Any failure, or an empty plan, yields a single query equal to `context`.
    pub async fn plan(
        &self,
        context: &str,
        target_count: usize,
        recent_learnings: Option<&[String]>,
    ) -> Vec<PlannedQuery> {
        let messages = vec![
            Message::system(prompts::system_prompt()),
            Message::user(prompts::query_plan_prompt(
                context,
                target_count,
                recent_learnings,
            )),
        ];

        let map = match self.completion.call(messages, ResponseKind::Queries).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Query planning failed, using fallback query");
                return vec![Self::fallback(context)];
            }
        };

        let planned: Vec<PlannedQuery> = map
            .get("queries")
            .and_then(|q| q.as_array())
            .map(|items| items.iter().filter_map(PlannedQuery::from_value).collect())
            .unwrap_or_default();

        if planned.is_empty() {
            warn!("Query plan was empty or malformed, using fallback query");
            return vec![Self::fallback(context)];
        }

        let planned: Vec<PlannedQuery> = planned.into_iter().take(target_count.max(1)).collect();
        if planned.len() < target_count {
            info!(
                requested = target_count,
                planned = planned.len(),
                "Planner returned fewer queries than requested"
            );
        }
        for (rank, q) in planned.iter().enumerate() {
            info!(rank = rank + 1, query = %q.query, goal = %q.research_goal, "Planned query");
        }
        planned
    }

    fn fallback(context: &str) -> PlannedQuery {
        PlannedQuery::new(context, FALLBACK_RESEARCH_GOAL)
    }
}
