//! Brave web search
//!
//! `GET {url}?q=<query>&count=<n>` with the key in `X-Subscription-Token`.
//! Keys rotate through the same retry controller as completions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{SearchError, SearchSource, SourceResult};
use crate::cancel::AbortSignal;
use crate::credentials::CredentialSet;
use crate::error::ProviderError;
use crate::retry::RetryController;

/// Tag for Brave results
pub const BRAVE_TAG: &str = "brave";

/// Default Brave web search endpoint
pub const DEFAULT_BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

/// Map a Brave response body onto results
fn parse_results(body: &str, count: usize) -> Result<Vec<SourceResult>, serde_json::Error> {
    let response: BraveResponse = serde_json::from_str(body)?;
    Ok(response
        .web
        .unwrap_or_default()
        .results
        .into_iter()
        .take(count)
        .map(|r| SourceResult {
            title: r.title,
            url: r.url,
            description: r.description,
            source: BRAVE_TAG.to_string(),
            full_content: None,
        })
        .collect())
}

/// Brave Search API source
#[derive(Debug)]
pub struct BraveSource {
    url: String,
    credentials: Arc<CredentialSet>,
    retry: RetryController,
    http_client: reqwest::Client,
}

impl BraveSource {
    /// Create a source for `url` rotating through `credentials`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        url: impl Into<String>,
        credentials: Arc<CredentialSet>,
        retry: RetryController,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            credentials,
            retry,
            http_client,
        })
    }

    /// Shared rotation state
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialSet> {
        &self.credentials
    }

    async fn search_with_key(
        &self,
        query: &str,
        count: usize,
        api_key: &str,
    ) -> Result<Vec<SourceResult>, ProviderError> {
        let provider = self.credentials.provider();
        let count_param = count.to_string();
        let response = self
            .http_client
            .get(&self.url)
            .query(&[("q", query), ("count", count_param.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await
            .map_err(|e| ProviderError::network(provider, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: provider.to_string(),
                status,
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(provider, e))?;

        // An unreadable body is treated like a failed call so the next key is tried
        parse_results(&body, count).map_err(|e| ProviderError::network(provider, e))
    }
}

#[async_trait]
impl SearchSource for BraveSource {
    fn tag(&self) -> &str {
        BRAVE_TAG
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SourceResult>, SearchError> {
        // Dropping this future (aggregator timeout) is the only way a search is cut short
        let never = AbortSignal::new();
        let results = self
            .retry
            .call(&self.credentials, &never, move |key| async move {
                self.search_with_key(query, count, &key).await
            })
            .await?;
        Ok(results)
    }
}
