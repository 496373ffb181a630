//! OpenAI-compatible LLM provider.
//!
//! Supports OpenAI, DeepSeek, OpenRouter, Gemini's OpenAI endpoint, Ollama,
//! vLLM, LM Studio, and any endpoint that follows the chat completions format.

use crate::brain::{LlmProvider, TokenCounter};
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Message, ResponseFormat, Role, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Retry hint used when a 429 carries no usable header or message.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// OpenAI-compatible LLM provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    context_window: usize,
    timeout_secs: u64,
    token_counter: TokenCounter,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Takes `config.api_key` first, then the environment variable named by
    /// `config.api_key_env`. Local endpoints get a placeholder key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.resolved_base_url();
        let is_local = base_url.contains("localhost") || base_url.contains("127.0.0.1");

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!(
                    "{}: env var '{}' not set",
                    config.provider, config.api_key_env
                ),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url().trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            context_window: config.context_window,
            timeout_secs: config.timeout_secs,
            token_counter: TokenCounter::for_model(&config.model),
        })
    }

    /// Convert internal messages to OpenAI JSON format.
    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                json!({ "role": role, "content": msg.content })
            })
            .collect()
    }

    /// Build the request body for `/chat/completions`.
    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        });
        if request.response_format == ResponseFormat::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    /// Parse a chat completion body into a `CompletionResponse`.
    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice =
            body.get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "No choices in response".to_string(),
                })?;

        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No message in choice".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage = body
            .get("usage")
            .map(|u| TokenUsage {
                input_tokens: u
                    .get("prompt_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            message: Message::assistant(text),
            usage,
            model: body
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
            finish_reason,
        })
    }

    /// Seconds to wait from a `Retry-After` style header, if present.
    fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        let value = headers
            .get("retry-after")
            .or_else(|| headers.get("x-ratelimit-reset-requests"))
            .and_then(|v| v.to_str().ok())?;
        if let Ok(secs) = value.parse::<u64>() {
            return Some(secs);
        }
        value
            .strip_suffix('s')
            .and_then(|s| s.parse::<f64>().ok())
            .map(|secs| secs.ceil() as u64)
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed ({})", status);
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // "Rate limit ... try again in 20s"
                let from_message = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches(['s', '.']).parse::<u64>().ok())
                    });
                LlmError::RateLimited {
                    retry_after_secs: retry_after
                        .or(from_message)
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                }
            }
            s if s >= 500 => LlmError::Connection {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() || err.is_request() {
            LlmError::Connection {
                message: err.to_string(),
            }
        } else {
            LlmError::ApiRequest {
                message: format!("Request failed: {}", err),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(url = %url, model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let retry_after = Self::retry_after_header(response.headers());
        let response_body = response.text().await.map_err(|e| LlmError::Connection {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body, retry_after));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json, &self.model)
    }

    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        self.token_counter.count_messages(messages)
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            api_key_env: "DELVE_TEST_OPENAI_KEY".to_string(),
            ..Default::default()
        }
    }

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new_with_key(&test_config(), "sk-test".to_string()).unwrap()
    }

    #[test]
    fn test_messages_to_json_text() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ];
        let json = OpenAiCompatibleProvider::messages_to_json(&messages);
        assert_eq!(json.len(), 3);
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "You are helpful");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[2]["role"], "assistant");
    }

    #[test]
    fn test_request_body_json_mode() {
        let request = CompletionRequest {
            messages: vec![Message::user("Return JSON")],
            response_format: ResponseFormat::JsonObject,
            ..Default::default()
        };
        let body = provider().request_body(&request);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 8192);

        let plain = provider().request_body(&CompletionRequest::default());
        assert!(plain.get("response_format").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let body = json!({
            "id": "chatcmpl-123",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"queries\": []}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18 },
            "model": "gpt-4o"
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body, "gpt-4o").unwrap();
        assert_eq!(resp.message.content, "{\"queries\": []}");
        assert_eq!(resp.usage.input_tokens, 10);
        assert_eq!(resp.usage.output_tokens, 8);
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.model, "gpt-4o");
    }

    #[test]
    fn test_parse_response_no_choices() {
        let body = json!({"choices": []});
        let result = OpenAiCompatibleProvider::parse_response(&body, "gpt-4o");
        assert!(matches!(result, Err(LlmError::ResponseParse { .. })));
    }

    #[test]
    fn test_parse_response_empty_content() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        });
        let result = OpenAiCompatibleProvider::parse_response(&body, "gpt-4o");
        assert!(matches!(result, Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn test_http_error_mapping_401() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            "Unauthorized",
            None,
        );
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_http_error_mapping_429_from_message() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached. Please try again in 20s"}}"#,
            None,
        );
        match err {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 20),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_mapping_429_header_wins() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down",
            Some(7),
        );
        match err {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 7),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_mapping_500_is_transient() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            None,
        );
        match err {
            LlmError::Connection { message } => assert!(message.contains("500")),
            other => panic!("Expected Connection, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", "12".parse().unwrap());
        assert_eq!(OpenAiCompatibleProvider::retry_after_header(&headers), Some(12));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-reset-requests", "1.5s".parse().unwrap());
        assert_eq!(OpenAiCompatibleProvider::retry_after_header(&headers), Some(2));

        assert_eq!(
            OpenAiCompatibleProvider::retry_after_header(&reqwest::header::HeaderMap::new()),
            None
        );
    }

    #[test]
    fn test_new_reads_env() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::set_var("DELVE_TEST_OPENAI_KEY", "sk-test-key") };
        let provider = OpenAiCompatibleProvider::new(&test_config()).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
        assert_eq!(provider.context_window(), 128_000);
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("DELVE_TEST_OPENAI_KEY") };
    }

    #[test]
    fn test_new_missing_key() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("DELVE_TEST_OPENAI_KEY_MISSING") };
        let mut config = test_config();
        config.api_key_env = "DELVE_TEST_OPENAI_KEY_MISSING".to_string();
        let result = OpenAiCompatibleProvider::new(&config);
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }

    #[test]
    fn test_ollama_provider_no_api_key_required() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            model: "qwen2.5:14b".to_string(),
            api_key_env: "DELVE_TEST_OLLAMA_UNSET".to_string(),
            ..Default::default()
        };
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.api_key, "ollama");
    }

    #[test]
    fn test_estimate_tokens_uses_counter() {
        let p = provider();
        let messages = vec![Message::user("hello there")];
        assert!(p.estimate_tokens(&messages) > 3);
    }
}
