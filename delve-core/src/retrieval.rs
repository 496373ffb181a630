//! Retrieval capability seams.
//!
//! The research loop only depends on [`RetrievalService`]. Concrete search
//! engines and scrapers live in `delve-tools` and are composed behind it.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One URL returned for a query. Empty `content` means the scrape failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub url: String,
    pub title: String,
    pub content: String,
}

impl RetrievedDocument {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    /// Whether there is usable text for extraction.
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// A search engine result before scraping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// 1-based rank in the engine's result list.
    pub position: usize,
}

/// Text extracted from a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, RetrievalError>;
}

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, RetrievalError>;
}

/// Search plus scrape: a query in, documents with page text out.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError>;
}
