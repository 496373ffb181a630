//! The structured completion client shared by all research steps.

use super::ResponseKind;
use super::repair::{JsonMap, parse_structured};
use crate::brain::{LlmProvider, TokenCounter};
use crate::config::RetryConfig;
use crate::error::LlmError;
use crate::providers::with_retry;
use crate::types::{CompletionRequest, Message, ResponseFormat, TokenUsage};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Calls the model in JSON mode, retries transient failures, and repairs
/// the output into a JSON object.
pub struct StructuredCompletion {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
    counter: TokenCounter,
    temperature: f32,
    usage: Mutex<TokenUsage>,
}

impl StructuredCompletion {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        let counter = TokenCounter::for_model(provider.model_name());
        Self {
            provider,
            retry,
            counter,
            temperature: 0.7,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Override the sampling temperature sent with every call.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Token counter matching the provider's model.
    pub fn token_counter(&self) -> &TokenCounter {
        &self.counter
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Token usage summed over every successful call.
    pub fn usage(&self) -> TokenUsage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }

    /// Send `messages` and return the parsed object.
    ///
    /// Transport errors surface only after the retry budget is spent.
    /// Unparseable output is not an error: it yields an empty map, and the
    /// caller falls back on missing fields.
    pub async fn call(&self, messages: Vec<Message>, kind: ResponseKind) -> Result<JsonMap, LlmError> {
        let estimated_tokens = self.counter.count_messages(&messages);
        info!(
            kind = %kind,
            model = self.provider.model_name(),
            messages = messages.len(),
            estimated_tokens,
            "Sending structured completion"
        );
        for (i, message) in messages.iter().enumerate() {
            debug!(
                index = i,
                role = %message.role,
                chars = message.content_length(),
                "Request message"
            );
        }

        let request = CompletionRequest {
            messages,
            temperature: self.temperature,
            response_format: ResponseFormat::JsonObject,
            ..Default::default()
        };
        let response = with_retry(&self.retry, || self.provider.complete(request.clone())).await?;

        if let Ok(mut usage) = self.usage.lock() {
            usage.accumulate(&response.usage);
        }
        info!(
            kind = %kind,
            chars = response.message.content.len(),
            output_tokens = response.usage.output_tokens,
            "Structured completion received"
        );

        Ok(parse_structured(&response.message.content, kind))
    }
}
