//! # Delve Tools
//!
//! Retrieval backends for the Delve research loop.
//! Provides search engines, page scrapers, and the services that combine
//! them behind [`RetrievalService`].

pub mod firecrawl;
pub mod html;
pub mod pipeline;
pub mod scrape;
pub mod search;

pub use firecrawl::FirecrawlRetrieval;
pub use pipeline::SearchAndScrape;
pub use scrape::{HttpScraper, SerperScraper};
pub use search::{DuckDuckGoSearch, SerperSearch};

use delve_core::config::{RetrievalBackend, RetrievalConfig};
use delve_core::error::RetrievalError;
use delve_core::retrieval::RetrievalService;
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP client for every backend.
pub fn http_client(config: &RetrievalConfig) -> Result<reqwest::Client, RetrievalError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| RetrievalError::Configuration {
            message: format!("failed to create HTTP client: {e}"),
        })
}

/// Read an API key from the named environment variable.
pub fn api_key_from_env(var: &str, backend: RetrievalBackend) -> Result<String, RetrievalError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(RetrievalError::Configuration {
            message: format!("backend '{backend}' requires an API key in ${var}"),
        }),
    }
}

/// Build the retrieval service selected by `config.backend`.
pub fn build_retrieval(
    config: &RetrievalConfig,
) -> Result<Arc<dyn RetrievalService>, RetrievalError> {
    let client = http_client(config)?;
    let max_chars = config.max_content_chars;

    let service: Arc<dyn RetrievalService> = match config.backend {
        RetrievalBackend::Duckduckgo => Arc::new(SearchAndScrape::new(
            DuckDuckGoSearch::new(client.clone()),
            HttpScraper::new(client, max_chars),
        )),
        RetrievalBackend::Serper => {
            let key = api_key_from_env(&config.serper_api_key_env, config.backend)?;
            Arc::new(SearchAndScrape::new(
                SerperSearch::new(client.clone(), key),
                HttpScraper::new(client, max_chars),
            ))
        }
        RetrievalBackend::SerperOnly => {
            let key = api_key_from_env(&config.serper_api_key_env, config.backend)?;
            Arc::new(SearchAndScrape::new(
                SerperSearch::new(client.clone(), key.clone()),
                SerperScraper::new(client, key, max_chars),
            ))
        }
        RetrievalBackend::Firecrawl => {
            let key = api_key_from_env(&config.firecrawl_api_key_env, config.backend)?;
            Arc::new(FirecrawlRetrieval::new(
                client,
                key,
                config.firecrawl_base_url.clone(),
                max_chars,
            ))
        }
    };
    tracing::info!(backend = %config.backend, "Retrieval backend ready");
    Ok(service)
}
