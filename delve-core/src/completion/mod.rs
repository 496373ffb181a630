//! Structured completion: JSON-shaped model calls with retry and repair.
//!
//! Every research step asks the model for a JSON object of a known
//! [`ResponseKind`]. [`StructuredCompletion`] handles transport retries and
//! [`repair`] turns whatever text comes back into a best-effort map.

pub mod repair;
pub mod structured;

pub use repair::{JsonMap, parse_structured};
pub use structured::StructuredCompletion;

/// Shape of a single expected field, used by the field-salvage strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Text,
    List,
    Number,
    Flag,
}

/// The call site a structured completion serves; names its expected keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    FollowUpQuestions,
    Goal,
    Queries,
    Learnings,
    Evaluation,
    Report,
}

impl ResponseKind {
    /// Keys the caller reads from the returned map.
    pub fn expected_fields(&self) -> &'static [(&'static str, FieldShape)] {
        match self {
            ResponseKind::FollowUpQuestions => &[("questions", FieldShape::List)],
            ResponseKind::Goal => &[
                ("primary_objective", FieldShape::Text),
                ("success_criteria", FieldShape::List),
                ("specific_questions", FieldShape::List),
            ],
            ResponseKind::Queries => &[("queries", FieldShape::List)],
            ResponseKind::Learnings => &[
                ("learnings", FieldShape::List),
                ("followUpQuestions", FieldShape::List),
            ],
            ResponseKind::Evaluation => &[
                ("alignment_score", FieldShape::Number),
                ("criteria_met", FieldShape::List),
                ("questions_answered", FieldShape::List),
                ("missing_aspects", FieldShape::List),
                ("next_research_directions", FieldShape::List),
                ("goal_achieved", FieldShape::Flag),
                ("continue_research", FieldShape::Flag),
            ],
            ResponseKind::Report => &[
                ("reportText", FieldShape::Text),
                ("reportMarkdown", FieldShape::Text),
            ],
        }
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResponseKind::FollowUpQuestions => "follow_up_questions",
            ResponseKind::Goal => "goal",
            ResponseKind::Queries => "queries",
            ResponseKind::Learnings => "learnings",
            ResponseKind::Evaluation => "evaluation",
            ResponseKind::Report => "report",
        };
        write!(f, "{name}")
    }
}

/// Read a list of non-empty strings from `map[key]`.
///
/// Accepts a JSON array (non-string items are skipped, strings are trimmed)
/// or a single string, which becomes a one-item list.
pub fn string_list(map: &JsonMap, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Read a trimmed, non-empty string from `map[key]`.
pub fn string_field(map: &JsonMap, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_expected_fields() {
        let goal: Vec<_> = ResponseKind::Goal
            .expected_fields()
            .iter()
            .map(|(k, _)| *k)
            .collect();
        assert_eq!(
            goal,
            vec!["primary_objective", "success_criteria", "specific_questions"]
        );
        assert_eq!(ResponseKind::Evaluation.expected_fields().len(), 7);
    }

    #[test]
    fn test_string_list_filters_noise() {
        let m = map(json!({"items": ["  a ", "", 3, "b", null]}));
        assert_eq!(string_list(&m, "items"), vec!["a", "b"]);
        assert!(string_list(&m, "missing").is_empty());
    }

    #[test]
    fn test_string_list_single_string() {
        let m = map(json!({"items": "only one"}));
        assert_eq!(string_list(&m, "items"), vec!["only one"]);
    }

    #[test]
    fn test_string_field() {
        let m = map(json!({"a": "  text  ", "b": "   ", "c": 1}));
        assert_eq!(string_field(&m, "a").as_deref(), Some("text"));
        assert_eq!(string_field(&m, "b"), None);
        assert_eq!(string_field(&m, "c"), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResponseKind::FollowUpQuestions.to_string(), "follow_up_questions");
        assert_eq!(ResponseKind::Report.to_string(), "report");
    }
}
