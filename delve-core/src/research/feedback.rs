//! Clarifying follow-up questions asked before research starts.

use crate::completion::{ResponseKind, StructuredCompletion, string_list};
use crate::prompts;
use crate::types::Message;
use std::sync::Arc;
use tracing::{info, warn};

/// Generic questions used when the model cannot produce any.
pub const FALLBACK_QUESTIONS: [&str; 5] = [
    "Which aspects of this topic matter most for your goals?",
    "What will you use the findings for, and who is the audience?",
    "How much depth do you need: an overview, a detailed analysis, or implementation guidance?",
    "Should the research focus on particular timeframes, regions, or sectors?",
    "What would make the outcome a success for you?",
];

/// Asks the model what to clarify about a research topic.
pub struct FollowUpGenerator {
    completion: Arc<StructuredCompletion>,
}

impl FollowUpGenerator {
    pub fn new(completion: Arc<StructuredCompletion>) -> Self {
        Self { completion }
    }

    /// Up to `max_questions` clarifying questions for `query`.
    pub async fn generate(&self, query: &str, max_questions: usize) -> Vec<String> {
        let messages = vec![
            Message::system(prompts::system_prompt()),
            Message::user(prompts::follow_up_questions_prompt(query, max_questions)),
        ];

        let mut questions = match self
            .completion
            .call(messages, ResponseKind::FollowUpQuestions)
            .await
        {
            Ok(map) => string_list(&map, "questions"),
            Err(e) => {
                warn!(error = %e, "Follow-up question generation failed");
                Vec::new()
            }
        };

        if questions.is_empty() {
            warn!("Using fallback follow-up questions");
            questions = FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect();
        }
        questions.truncate(max_questions);
        info!(count = questions.len(), "Follow-up questions ready");
        questions
    }
}
