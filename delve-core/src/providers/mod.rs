//! LLM provider implementations.
//!
//! Every supported backend speaks the OpenAI chat completions format
//! (OpenAI, DeepSeek, OpenRouter, Gemini's compatibility endpoint, Ollama,
//! vLLM, LM Studio). Use `create_provider()` to build one from config and
//! `with_retry()` to wrap calls in transient-error backoff.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use crate::config::RetryConfig;
pub use openai_compat::OpenAiCompatibleProvider;

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs`),
/// `LlmError::Connection`, and `LlmError::Timeout`. Permanent errors (auth, parse)
/// return immediately. Once the budget is spent the last error is returned.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is retryable (transient).
fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    if let LlmError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs * 1000;
        let computed = compute_exponential_backoff(config, attempt);
        return server_ms.max(computed);
    }
    compute_exponential_backoff(config, attempt)
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // up to 25%
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap time-derived value in `[0, 1)` for jitter.
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Create an LLM provider based on the configuration.
///
/// All providers go through `OpenAiCompatibleProvider`; the provider name
/// only selects the endpoint and key variable presets.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_wait_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    #[test]
    fn test_create_provider_openai() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::set_var("DELVE_TEST_PROVIDER_KEY", "test-key-123") };
        let config = LlmConfig {
            model: "test-model".to_string(),
            api_key_env: "DELVE_TEST_PROVIDER_KEY".to_string(),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "test-model");
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("DELVE_TEST_PROVIDER_KEY") };
    }

    #[test]
    fn test_create_provider_missing_key() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("DELVE_NONEXISTENT_KEY") };
        let config = LlmConfig {
            api_key_env: "DELVE_NONEXISTENT_KEY".to_string(),
            ..Default::default()
        };
        match create_provider(&config) {
            Err(LlmError::AuthFailed { provider }) => {
                assert!(provider.contains("DELVE_NONEXISTENT_KEY"));
            }
            Err(other) => panic!("Expected AuthFailed, got {:?}", other),
            Ok(_) => panic!("Expected AuthFailed, got a provider"),
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&LlmError::RateLimited {
            retry_after_secs: 30
        }));
        assert!(is_retryable(&LlmError::Connection {
            message: "reset".into()
        }));
        assert!(is_retryable(&LlmError::Timeout { timeout_secs: 30 }));
        assert!(!is_retryable(&LlmError::AuthFailed {
            provider: "test".into()
        }));
        assert!(!is_retryable(&LlmError::ResponseParse {
            message: "bad json".into()
        }));
        assert!(!is_retryable(&LlmError::EmptyResponse));
    }

    #[test]
    fn test_compute_backoff_exponential() {
        let config = RetryConfig {
            jitter: false,
            max_backoff_ms: 60_000,
            ..Default::default()
        };
        assert_eq!(compute_exponential_backoff(&config, 0), 1000);
        assert_eq!(compute_exponential_backoff(&config, 1), 2000);
        assert_eq!(compute_exponential_backoff(&config, 2), 4000);
    }

    #[test]
    fn test_compute_backoff_respects_cap() {
        let config = RetryConfig {
            max_backoff_ms: 3000,
            jitter: false,
            ..Default::default()
        };
        assert_eq!(compute_exponential_backoff(&config, 2), 3000);
    }

    #[test]
    fn test_compute_backoff_rate_limit_uses_server_value() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        let err = LlmError::RateLimited {
            retry_after_secs: 20,
        };
        assert_eq!(compute_backoff(&config, 0, &err), 20_000);
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::default();
        let backoff = compute_exponential_backoff(&config, 0);
        assert!((1000..=1250).contains(&backoff));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let config = RetryConfig::default();
        let result = with_retry(&config, || async { Ok::<_, LlmError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_no_retry() {
        let config = no_wait_retry(3);
        let calls = AtomicU32::new(0);
        let result = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<i32, _>(LlmError::AuthFailed {
                    provider: "test".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_rate_limit() {
        let config = no_wait_retry(3);
        let calls = AtomicU32::new(0);
        let result = with_retry(&config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::RateLimited {
                        retry_after_secs: 0,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_budget() {
        let config = no_wait_retry(2);
        let calls = AtomicU32::new(0);
        let result = with_retry(&config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(LlmError::Connection {
                    message: "refused".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(LlmError::Connection { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
