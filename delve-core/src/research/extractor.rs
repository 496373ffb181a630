//! Learning extraction from retrieved pages.

use crate::completion::{ResponseKind, StructuredCompletion, string_list};
use crate::prompts;
use crate::retrieval::RetrievedDocument;
use crate::types::Message;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Learnings and follow-up questions for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub learnings: Vec<String>,
    pub follow_ups: Vec<String>,
}

/// Turns a batch of documents into bounded learnings with one completion.
pub struct LearningExtractor {
    completion: Arc<StructuredCompletion>,
    content_token_limit: usize,
}

impl LearningExtractor {
    pub fn new(completion: Arc<StructuredCompletion>, content_token_limit: usize) -> Self {
        Self {
            completion,
            content_token_limit,
        }
    }

    /// Extract up to `max_learnings` learnings and `max_follow_ups` questions.
    ///
    /// Documents without content are left out of the prompt. When none have
    /// content, or the call fails, the result is empty.
    pub async fn extract(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> Extraction {
        let usable: Vec<&RetrievedDocument> = documents.iter().filter(|d| d.has_content()).collect();
        info!(
            query = %query,
            documents = documents.len(),
            with_content = usable.len(),
            "Extracting learnings"
        );
        if usable.is_empty() {
            warn!(query = %query, "No scraped content for query, skipping extraction");
            return Extraction::default();
        }

        let counter = self.completion.token_counter();
        let contents: String = usable
            .iter()
            .map(|doc| {
                let text = counter.trim_to_tokens(&doc.content, self.content_token_limit);
                format!("<content>\n{text}\n</content>")
            })
            .collect();
        debug!(chars = contents.len(), "Extraction context assembled");

        let messages = vec![
            Message::system(prompts::system_prompt()),
            Message::user(prompts::extraction_prompt(
                query,
                &contents,
                max_learnings,
                max_follow_ups,
            )),
        ];

        match self.completion.call(messages, ResponseKind::Learnings).await {
            Ok(map) => {
                let mut learnings = string_list(&map, "learnings");
                learnings.truncate(max_learnings);
                let mut follow_ups = string_list(&map, "followUpQuestions");
                follow_ups.truncate(max_follow_ups);
                info!(
                    query = %query,
                    learnings = learnings.len(),
                    follow_ups = follow_ups.len(),
                    "Learnings extracted"
                );
                Extraction {
                    learnings,
                    follow_ups,
                }
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Learning extraction failed");
                Extraction::default()
            }
        }
    }
}
