//! Search-then-scrape composition behind [`RetrievalService`].

use async_trait::async_trait;
use delve_core::error::RetrievalError;
use delve_core::retrieval::{RetrievalService, RetrievedDocument, Scraper, SearchEngine, SearchHit};
use futures::future::join_all;
use tracing::{info, warn};

/// Runs a search, then scrapes every hit concurrently.
///
/// A failed scrape yields a document with empty content; only a failed
/// search is an error.
pub struct SearchAndScrape<E, S> {
    engine: E,
    scraper: S,
}

impl<E: SearchEngine, S: Scraper> SearchAndScrape<E, S> {
    pub fn new(engine: E, scraper: S) -> Self {
        Self { engine, scraper }
    }

    async fn scrape_hit(&self, hit: SearchHit) -> RetrievedDocument {
        match self.scraper.scrape(&hit.url).await {
            Ok(page) => RetrievedDocument {
                title: page
                    .title
                    .filter(|t| !t.is_empty())
                    .unwrap_or(hit.title),
                url: hit.url,
                content: page.content,
            },
            Err(e) => {
                warn!(url = %hit.url, error = %e, "Scrape failed, keeping URL without content");
                RetrievedDocument::new(hit.url, hit.title, "")
            }
        }
    }
}

#[async_trait]
impl<E: SearchEngine, S: Scraper> RetrievalService for SearchAndScrape<E, S> {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let mut hits = self.engine.search(query, limit).await?;
        let mut seen = std::collections::HashSet::new();
        hits.retain(|h| seen.insert(h.url.clone()));
        hits.truncate(limit);

        let documents = join_all(hits.into_iter().map(|hit| self.scrape_hit(hit))).await;
        info!(
            engine = self.engine.name(),
            query = %query,
            urls = documents.len(),
            with_content = documents.iter().filter(|d| d.has_content()).count(),
            "Retrieval complete"
        );
        Ok(documents)
    }
}
