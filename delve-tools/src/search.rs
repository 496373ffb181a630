//! Search engines: DuckDuckGo (HTML endpoint) and Serper.

use crate::html::{decode_entities, inline_text};
use async_trait::async_trait;
use delve_core::error::RetrievalError;
use delve_core::retrieval::{SearchEngine, SearchHit};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::debug;

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const SERPER_SEARCH_URL: &str = "https://google.serper.dev/search";
/// Serper rejects larger result counts.
const SERPER_MAX_RESULTS: usize = 100;

static DDG_RESULT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("valid result link regex")
});
static DDG_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(?:a|div|td)[^>]*class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|div|td)>"#)
        .expect("valid snippet regex")
});

// ---------------------------------------------------------------------------
// DuckDuckGoSearch
// ---------------------------------------------------------------------------

/// DuckDuckGo's HTML results page. Needs no API key.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DUCKDUCKGO_HTML_URL.to_string(),
        }
    }

    /// Point at a different results endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn error(message: impl Into<String>) -> RetrievalError {
        RetrievalError::Search {
            engine: "duckduckgo".into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl SearchEngine for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error(format!("HTTP {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Self::error(format!("failed to read response body: {e}")))?;

        let hits = parse_duckduckgo_html(&body, limit);
        debug!(query = %query, hits = hits.len(), "DuckDuckGo search complete");
        Ok(hits)
    }
}

/// Parse result links and snippets from a DuckDuckGo HTML results page.
///
/// Ads and links that do not resolve to an http(s) target are skipped.
pub fn parse_duckduckgo_html(html: &str, limit: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = DDG_SNIPPET
        .captures_iter(html)
        .map(|c| inline_text(&c[1]))
        .collect();

    let mut hits = Vec::new();
    for (index, caps) in DDG_RESULT_LINK.captures_iter(html).enumerate() {
        if hits.len() >= limit {
            break;
        }
        let Some(url) = resolve_result_url(&caps[1]) else {
            continue;
        };
        if hits.iter().any(|h: &SearchHit| h.url == url) {
            continue;
        }
        hits.push(SearchHit {
            title: inline_text(&caps[2]),
            url,
            snippet: snippets.get(index).cloned().unwrap_or_default(),
            position: hits.len() + 1,
        });
    }
    hits
}

/// Turn a DuckDuckGo result href into the target URL.
///
/// Result links go through a `/l/?uddg=<target>` redirect; the target is
/// taken from the `uddg` parameter. Ad links (`/y.js`) yield `None`.
pub fn resolve_result_url(href: &str) -> Option<String> {
    let href = decode_entities(href.trim());
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href
    };

    let parsed = url::Url::parse(&absolute).ok()?;
    let is_ddg = parsed
        .host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"));
    if is_ddg {
        if parsed.path() == "/y.js" {
            return None;
        }
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        return matches!(url::Url::parse(&target), Ok(u) if u.scheme() == "http" || u.scheme() == "https")
            .then_some(target);
    }
    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

// ---------------------------------------------------------------------------
// SerperSearch
// ---------------------------------------------------------------------------

/// Google results through the Serper API.
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
    position: Option<usize>,
}

impl SerperSearch {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: SERPER_SEARCH_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn error(message: impl Into<String>) -> RetrievalError {
        RetrievalError::Search {
            engine: "serper".into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl SearchEngine for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let payload = serde_json::json!({
            "q": query,
            "num": limit.clamp(1, SERPER_MAX_RESULTS),
        });
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error(format!("HTTP {status}: {body}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Self::error(format!("failed to read response body: {e}")))?;
        let hits = parse_serper_response(&body, limit).map_err(Self::error)?;
        debug!(query = %query, hits = hits.len(), "Serper search complete");
        Ok(hits)
    }
}

/// Parse Serper's `organic` results.
pub fn parse_serper_response(body: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
    let parsed: SerperResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid response: {e}"))?;
    Ok(parsed
        .organic
        .into_iter()
        .filter(|r| !r.link.is_empty())
        .take(limit)
        .enumerate()
        .map(|(i, r)| SearchHit {
            title: r.title,
            url: r.link,
            snippet: r.snippet,
            position: r.position.unwrap_or(i + 1),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DDG_PAGE: &str = r##"
        <div class="result results_links results_links_deep web-result">
          <h2 class="result__title">
            <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.iea.org%2Freports%2Fheat-pumps&amp;rut=abc">The Future of <b>Heat Pumps</b></a>
          </h2>
          <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">Heat pumps are <b>set</b> to grow.</a>
        </div>
        <div class="result result--ad">
          <a rel="nofollow" class="result__a" href="https://duckduckgo.com/y.js?ad_provider=bing&amp;u3=x">Buy now</a>
          <a class="result__snippet" href="#">Ad copy</a>
        </div>
        <div class="result">
          <a rel="nofollow" class="result__a" href="https://example.org/direct">Direct link</a>
          <a class="result__snippet" href="#">Plain snippet</a>
        </div>
    "##;

    #[test]
    fn test_resolve_result_url() {
        assert_eq!(
            resolve_result_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fa.example%2Fp%3Fx%3D1&amp;rut=z")
                .as_deref(),
            Some("https://a.example/p?x=1")
        );
        assert_eq!(resolve_result_url("https://duckduckgo.com/y.js?ad=1"), None);
        assert_eq!(
            resolve_result_url("https://b.example/").as_deref(),
            Some("https://b.example/")
        );
        assert_eq!(resolve_result_url("javascript:void(0)"), None);
    }

    #[test]
    fn test_parse_duckduckgo_html() {
        let hits = parse_duckduckgo_html(DDG_PAGE, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.iea.org/reports/heat-pumps");
        assert_eq!(hits[0].title, "The Future of Heat Pumps");
        assert_eq!(hits[0].snippet, "Heat pumps are set to grow.");
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[1].url, "https://example.org/direct");
        assert_eq!(hits[1].position, 2);
    }

    #[test]
    fn test_parse_duckduckgo_respects_limit() {
        assert_eq!(parse_duckduckgo_html(DDG_PAGE, 1).len(), 1);
        assert!(parse_duckduckgo_html("<html>no results</html>", 5).is_empty());
    }

    #[test]
    fn test_parse_serper_response() {
        let body = r#"{
            "searchParameters": {"q": "heat pumps"},
            "organic": [
                {"title": "A", "link": "https://a.example", "snippet": "sa", "position": 1},
                {"title": "B", "link": "https://b.example", "position": 2},
                {"title": "C", "link": "https://c.example", "snippet": "sc"}
            ]
        }"#;
        let hits = parse_serper_response(body, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].snippet, "");
        assert_eq!(hits[1].url, "https://b.example");

        let empty = parse_serper_response(r#"{"searchParameters": {}}"#, 5).unwrap();
        assert!(empty.is_empty());
        assert!(parse_serper_response("nope", 5).is_err());
    }
}
