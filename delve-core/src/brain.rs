//! Brain module: the language-model seam used by every research step.
//!
//! Provides the `LlmProvider` trait, token counting via tiktoken-rs, and a
//! scriptable mock provider for tests and offline runs.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest slice `TokenCounter::trim_to_tokens` will cut text down to.
pub const MIN_CHUNK_SIZE: usize = 140;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Estimate the token count for a set of messages.
    fn estimate_tokens(&self, messages: &[Message]) -> usize;

    /// Return the context window size for this provider/model.
    fn context_window(&self) -> usize;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Token counter using tiktoken-rs for accurate BPE tokenization.
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Create a token counter for the given model.
    /// Falls back to cl100k_base if the model isn't recognized.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model).unwrap_or_else(|_| {
            tiktoken_rs::cl100k_base().expect("cl100k_base should be available")
        });
        Self { bpe }
    }

    /// Count the number of tokens in a string.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Estimate the token count for a set of messages.
    /// Adds overhead for message structure (role, separators).
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        let mut total = 0;
        for msg in messages {
            // role token + separators
            total += 4;
            total += self.count(&msg.content);
        }
        total + 3
    }

    /// Trim `text` so it fits within `limit` tokens.
    ///
    /// Cuts at the last paragraph, line, or word boundary inside the budget,
    /// shrinking by roughly three characters per overflowing token on each
    /// pass. Never returns fewer than [`MIN_CHUNK_SIZE`] characters unless the
    /// input is shorter than that.
    pub fn trim_to_tokens(&self, text: &str, limit: usize) -> String {
        let mut current = text.to_string();
        loop {
            let tokens = self.count(&current);
            if tokens <= limit {
                return current;
            }

            let overflow = tokens - limit;
            let char_len = current.chars().count();
            let chunk_size = char_len.saturating_sub(overflow * 3);
            if chunk_size < MIN_CHUNK_SIZE {
                return current.chars().take(MIN_CHUNK_SIZE).collect();
            }

            let prefix: String = current.chars().take(chunk_size).collect();
            let cut = boundary_cut(&prefix);
            current = if cut.is_empty() || cut.len() == current.len() {
                prefix
            } else {
                cut.to_string()
            };
        }
    }
}

/// Longest prefix of `text` ending on a paragraph, line, or word boundary.
fn boundary_cut(text: &str) -> &str {
    for sep in ["\n\n", "\n", " "] {
        if let Some(pos) = text.rfind(sep)
            && pos > 0
        {
            return text[..pos].trim_end();
        }
    }
    text
}

/// A mock LLM provider for testing and offline development.
///
/// Responses are resolved in this order: routed responses whose marker
/// appears in any request message, then the FIFO queue, then a default
/// text. A failing mock returns `LlmError::ApiRequest` for every call.
pub struct MockLlmProvider {
    model: String,
    context_window: usize,
    failing: bool,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    routes: Mutex<Vec<(String, VecDeque<String>)>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            context_window: 128_000,
            failing: false,
            responses: Mutex::new(VecDeque::new()),
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a MockLlmProvider whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        provider.route("", [text]);
        provider
    }

    /// Queue a response to be returned by the next unrouted `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error to be returned by the next unrouted `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Answer any request containing `marker` with the given texts in order.
    ///
    /// The last text repeats once the earlier ones are used up, so a single
    /// text makes a sticky route.
    pub fn route<I, S>(&self, marker: &str, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts: VecDeque<String> = texts.into_iter().map(Into::into).collect();
        self.routes
            .lock()
            .unwrap()
            .push((marker.to_string(), texts));
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    fn routed_text(&self, request: &CompletionRequest) -> Option<String> {
        let mut routes = self.routes.lock().unwrap();
        let (_, texts) = routes.iter_mut().find(|(marker, _)| {
            request
                .messages
                .iter()
                .any(|m| m.content.contains(marker.as_str()))
        })?;
        if texts.len() > 1 {
            texts.pop_front()
        } else {
            texts.front().cloned()
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if self.failing {
            return Err(LlmError::ApiRequest {
                message: "mock provider configured to fail".to_string(),
            });
        }
        if let Some(text) = self.routed_text(&request) {
            return Ok(Self::text_response(&text));
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Self::text_response(
                "I'm a mock LLM. No queued responses available.",
            )),
        }
    }

    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        // ~4 chars per token
        messages.iter().map(|m| m.content.len() / 4).sum::<usize>() + 100
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
