//! Concurrent source fan-out with per-source timeouts and url dedupe

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::{SearchSource, SourceResult};

/// Fires enabled sources concurrently and merges their results
#[derive(Clone)]
pub struct SearchAggregator {
    /// Registered sources in provider (merge) order
    sources: Vec<Arc<dyn SearchSource>>,
    /// Result count hint passed to every source
    result_count: usize,
    /// Upper bound on one source's search
    source_timeout: Duration,
}

impl std::fmt::Debug for SearchAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAggregator")
            .field("sources", &self.tags())
            .field("result_count", &self.result_count)
            .field("source_timeout", &self.source_timeout)
            .finish()
    }
}

impl SearchAggregator {
    /// Create an aggregator with no sources
    #[must_use]
    pub fn new(result_count: usize, source_timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            result_count,
            source_timeout,
        }
    }

    /// Register a source; registration order is merge order
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn SearchSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Tags of the registered sources, in merge order
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.tag()).collect()
    }

    /// Query every enabled source and merge the results
    ///
    /// A source that errors or exceeds the timeout contributes nothing.
    /// Results are merged in registration order, keeping the first hit for
    /// each url.
    pub async fn aggregate(&self, query: &str, enabled: &[String]) -> Vec<SourceResult> {
        self.search(query, enabled).await.results
    }

    /// Like [`aggregate`](Self::aggregate), also reporting how many sources failed
    pub async fn search(&self, query: &str, enabled: &[String]) -> SearchReport {
        for tag in enabled {
            if !self.sources.iter().any(|s| s.tag() == tag) {
                tracing::debug!(source = %tag, "Ignoring unknown search source");
            }
        }

        let active: Vec<&Arc<dyn SearchSource>> = self
            .sources
            .iter()
            .filter(|s| enabled.iter().any(|tag| tag == s.tag()))
            .collect();

        if active.is_empty() || query.trim().is_empty() {
            return SearchReport::default();
        }

        let searches = active.iter().map(|source| async move {
            match tokio::time::timeout(self.source_timeout, source.search(query, self.result_count))
                .await
            {
                Ok(Ok(results)) => {
                    tracing::debug!(source = %source.tag(), count = results.len(), "Search source returned");
                    Some(results)
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = %source.tag(), error = %e, "Search source failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        source = %source.tag(),
                        timeout_ms = self.source_timeout.as_millis(),
                        "Search source timed out"
                    );
                    None
                }
            }
        });

        let outcomes = join_all(searches).await;
        let failed = outcomes.iter().filter(|o| o.is_none()).count();
        SearchReport {
            queried: outcomes.len(),
            failed,
            results: merge_dedupe(outcomes.into_iter().map(Option::unwrap_or_default).collect()),
        }
    }
}

/// Merged results plus per-source failure counts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchReport {
    /// Deduplicated results in citation order
    pub results: Vec<SourceResult>,
    /// Sources that were queried
    pub queried: usize,
    /// Sources that errored or timed out
    pub failed: usize,
}

impl SearchReport {
    /// Whether sources were queried and every one of them failed
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.queried > 0 && self.failed == self.queried
    }
}

/// Concatenate per-source lists in order, keeping the first result per url
#[must_use]
pub fn merge_dedupe(lists: Vec<Vec<SourceResult>>) -> Vec<SourceResult> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|result| seen.insert(result.url.clone()))
        .collect()
}
