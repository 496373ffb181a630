//! Firecrawl search with inline scraping.

use crate::html::truncate_chars;
use async_trait::async_trait;
use delve_core::error::RetrievalError;
use delve_core::retrieval::{RetrievalService, RetrievedDocument};
use serde::Deserialize;
use tracing::{info, warn};

/// One Firecrawl call returns search results with page markdown attached.
pub struct FirecrawlRetrieval {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct FirecrawlResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Vec<FirecrawlItem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlItem {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

impl FirecrawlRetrieval {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        max_chars: usize,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_chars,
        }
    }

    fn error(message: impl Into<String>) -> RetrievalError {
        RetrievalError::Search {
            engine: "firecrawl".into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl RetrievalService for FirecrawlRetrieval {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let payload = serde_json::json!({
            "query": query,
            "limit": limit,
            "scrapeOptions": { "formats": ["markdown"] },
        });
        let response = self
            .client
            .post(format!("{}/v1/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::error(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::error(format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            return Err(Self::error(format!("HTTP {status}: {body}")));
        }

        let documents = parse_firecrawl_response(&body, limit, self.max_chars).map_err(Self::error)?;
        info!(
            query = %query,
            urls = documents.len(),
            with_content = documents.iter().filter(|d| d.has_content()).count(),
            "Firecrawl retrieval complete"
        );
        Ok(documents)
    }
}

/// Parse a `/v1/search` response body into documents.
///
/// Items without markdown keep their URL with empty content.
pub fn parse_firecrawl_response(
    body: &str,
    limit: usize,
    max_chars: usize,
) -> Result<Vec<RetrievedDocument>, String> {
    let parsed: FirecrawlResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid response: {e}"))?;
    if parsed.success == Some(false) {
        return Err(parsed
            .error
            .unwrap_or_else(|| "request was not successful".to_string()));
    }

    let mut documents: Vec<RetrievedDocument> = Vec::new();
    for item in parsed.data {
        if item.url.is_empty() || documents.iter().any(|d| d.url == item.url) {
            continue;
        }
        if item.markdown.is_none() {
            warn!(url = %item.url, "Firecrawl returned no markdown for result");
        }
        let title = item
            .title
            .or(item.description)
            .unwrap_or_default();
        let content = item
            .markdown
            .map(|m| truncate_chars(m.trim(), max_chars))
            .unwrap_or_default();
        documents.push(RetrievedDocument::new(item.url, title, content));
        if documents.len() >= limit {
            break;
        }
    }
    Ok(documents)
}
