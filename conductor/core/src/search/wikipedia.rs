//! Wikipedia source
//!
//! Key-less. A `list=search` query finds matching articles, then the plain
//! text intro of the top hits is fetched with `prop=extracts` and attached as
//! `full_content`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use super::{SearchError, SearchSource, SourceResult};

/// Tag for Wikipedia results
pub const WIKIPEDIA_TAG: &str = "wikipedia";

/// Default MediaWiki API endpoint
pub const DEFAULT_WIKIPEDIA_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Number of top hits whose intro extract is fetched
pub const EXTRACT_LIMIT: usize = 3;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    #[serde(default)]
    extract: Option<String>,
}

/// Remove markup such as `<span class="searchmatch">` from a snippet
fn strip_tags(snippet: &str) -> String {
    let mut out = String::with_capacity(snippet.len());
    let mut in_tag = false;
    for c in snippet.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Article base (`https://host/wiki/`) derived from the API endpoint
fn article_base(api_url: &str) -> String {
    match api_url.strip_suffix("/w/api.php") {
        Some(host) => format!("{host}/wiki/"),
        None => "https://en.wikipedia.org/wiki/".to_string(),
    }
}

fn parse_hits(body: &str) -> Result<Vec<SearchHit>, serde_json::Error> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response.query.map(|q| q.search).unwrap_or_default())
}

fn parse_extract(body: &str) -> Result<Option<String>, serde_json::Error> {
    let response: ExtractResponse = serde_json::from_str(body)?;
    Ok(response
        .query
        .and_then(|q| q.pages.into_values().find_map(|p| p.extract))
        .filter(|text| !text.trim().is_empty()))
}

/// MediaWiki search source
#[derive(Clone, Debug)]
pub struct WikipediaSource {
    api_url: String,
    article_base: String,
    http_client: reqwest::Client,
}

impl WikipediaSource {
    /// Create a source for a MediaWiki `api.php` endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let api_url = api_url.into();
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            article_base: article_base(&api_url),
            api_url,
            http_client,
        })
    }

    fn error(&self, e: impl std::fmt::Display) -> SearchError {
        SearchError::Request {
            source_tag: WIKIPEDIA_TAG.to_string(),
            message: e.to_string(),
        }
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<String, SearchError> {
        let response = self
            .http_client
            .get(&self.api_url)
            .query(params)
            .query(&[("format", "json")])
            .send()
            .await
            .map_err(|e| self.error(e))?;

        if !response.status().is_success() {
            return Err(SearchError::Http {
                source_tag: WIKIPEDIA_TAG.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|e| self.error(e))
    }

    async fn extract(&self, title: &str) -> Option<String> {
        let body = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("titles", title),
            ])
            .await;

        match body.map(|b| parse_extract(&b)) {
            Ok(Ok(extract)) => extract,
            Ok(Err(e)) => {
                tracing::debug!(title = %title, error = %e, "Unreadable extract response");
                None
            }
            Err(e) => {
                tracing::debug!(title = %title, error = %e, "Extract fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl SearchSource for WikipediaSource {
    fn tag(&self) -> &str {
        WIKIPEDIA_TAG
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SourceResult>, SearchError> {
        let limit = count.to_string();
        let body = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ])
            .await?;

        let hits = parse_hits(&body).map_err(|e| SearchError::Decode {
            source_tag: WIKIPEDIA_TAG.to_string(),
            message: e.to_string(),
        })?;

        let hits: Vec<SearchHit> = hits.into_iter().take(count).collect();
        let extracts = join_all(
            hits.iter()
                .take(EXTRACT_LIMIT)
                .map(|hit| self.extract(&hit.title)),
        )
        .await;

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SourceResult {
                url: format!("{}{}", self.article_base, hit.title.replace(' ', "_")),
                description: strip_tags(&hit.snippet),
                full_content: extracts.get(i).cloned().flatten(),
                title: hit.title,
                source: WIKIPEDIA_TAG.to_string(),
            })
            .collect())
    }
}
