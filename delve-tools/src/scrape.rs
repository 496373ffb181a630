//! Page scrapers: direct HTTP fetch and the Serper scrape endpoint.

use crate::html::{extract_text_from_html, page_title, truncate_chars};
use async_trait::async_trait;
use delve_core::error::RetrievalError;
use delve_core::retrieval::{ScrapedPage, Scraper};
use serde::Deserialize;
use tracing::debug;

const SERPER_SCRAPE_URL: &str = "https://scrape.serper.dev";

fn scrape_error(url: &str, message: impl Into<String>) -> RetrievalError {
    RetrievalError::Scrape {
        url: url.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// HttpScraper
// ---------------------------------------------------------------------------

/// Fetches a URL and extracts readable text. No browser required.
pub struct HttpScraper {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpScraper {
    pub fn new(client: reqwest::Client, max_chars: usize) -> Self {
        Self { client, max_chars }
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, RetrievalError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(scrape_error(url, "URL must start with http:// or https://"));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| scrape_error(url, format!("fetch failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(scrape_error(url, format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| scrape_error(url, format!("failed to read response body: {e}")))?;

        let page = page_from_body(url, &content_type, &body, self.max_chars)
            .ok_or_else(|| scrape_error(url, format!("unsupported content type '{content_type}'")))?;
        debug!(url = %url, chars = page.content.len(), "Scraped page");
        Ok(page)
    }
}

/// Build a page from a fetched body, or `None` for non-text content.
pub fn page_from_body(
    url: &str,
    content_type: &str,
    body: &str,
    max_chars: usize,
) -> Option<ScrapedPage> {
    let is_html = content_type.contains("text/html") || content_type.contains("application/xhtml");
    // Servers that omit the header usually send HTML.
    let looks_like_html = content_type.is_empty() && body.trim_start().starts_with('<');

    let (title, text) = if is_html || looks_like_html {
        (page_title(body), extract_text_from_html(body))
    } else if content_type.starts_with("text/") || content_type.contains("json") {
        (None, body.trim().to_string())
    } else {
        return None;
    };

    Some(ScrapedPage {
        url: url.to_string(),
        title,
        content: truncate_chars(&text, max_chars),
    })
}

// ---------------------------------------------------------------------------
// SerperScraper
// ---------------------------------------------------------------------------

/// Page text through the Serper scrape API.
pub struct SerperScraper {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_chars: usize,
}

#[derive(Debug, Deserialize)]
struct SerperScrapeResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Option<SerperScrapeMetadata>,
}

#[derive(Debug, Deserialize)]
struct SerperScrapeMetadata {
    title: Option<String>,
}

impl SerperScraper {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, max_chars: usize) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: SERPER_SCRAPE_URL.to_string(),
            max_chars,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Scraper for SerperScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, RetrievalError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| scrape_error(url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(scrape_error(url, format!("HTTP {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| scrape_error(url, format!("failed to read response body: {e}")))?;
        parse_serper_scrape(url, &body, self.max_chars).map_err(|m| scrape_error(url, m))
    }
}

/// Parse a Serper scrape response body.
pub fn parse_serper_scrape(url: &str, body: &str, max_chars: usize) -> Result<ScrapedPage, String> {
    let parsed: SerperScrapeResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid response: {e}"))?;
    Ok(ScrapedPage {
        url: url.to_string(),
        title: parsed
            .metadata
            .and_then(|m| m.title)
            .filter(|t| !t.trim().is_empty()),
        content: truncate_chars(parsed.text.trim(), max_chars),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_from_html_body() {
        let html = "<html><head><title>Report</title></head><body><p>Alpha</p><p>Beta</p></body></html>";
        let page = page_from_body("https://a.example", "text/html; charset=utf-8", html, 1000).unwrap();
        assert_eq!(page.title.as_deref(), Some("Report"));
        assert!(page.content.ends_with("Alpha\nBeta"));
    }

    #[test]
    fn test_page_from_body_truncates() {
        let page = page_from_body("u", "text/plain", "abcdefghij", 4).unwrap();
        assert_eq!(page.content, "abcd");
        assert_eq!(page.title, None);
    }

    #[test]
    fn test_page_from_body_sniffs_missing_content_type() {
        let page = page_from_body("u", "", "<p>hello</p>", 100).unwrap();
        assert_eq!(page.content, "hello");
    }

    #[test]
    fn test_page_from_binary_body_is_rejected() {
        assert!(page_from_body("u", "application/pdf", "%PDF-1.7", 100).is_none());
    }

    #[test]
    fn test_parse_serper_scrape() {
        let page = parse_serper_scrape(
            "https://a.example",
            r#"{"text": "  Body text  ", "metadata": {"title": "A page"}}"#,
            100,
        )
        .unwrap();
        assert_eq!(page.content, "Body text");
        assert_eq!(page.title.as_deref(), Some("A page"));

        let bare = parse_serper_scrape("u", r#"{"text": "x"}"#, 100).unwrap();
        assert_eq!(bare.title, None);
        assert!(parse_serper_scrape("u", "<html>", 100).is_err());
    }

    #[tokio::test]
    async fn test_http_scraper_rejects_non_http_url() {
        let scraper = HttpScraper::new(reqwest::Client::new(), 100);
        let err = scraper.scrape("ftp://files.example/x").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Scrape { .. }));
    }
}
