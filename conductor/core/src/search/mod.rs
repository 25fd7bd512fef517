//! Search Aggregation
//!
//! Web and knowledge sources queried before answering, merged into one
//! citation list.
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────────────────┐
//!    query ───────► │ SearchAggregator │
//!                   └───┬─────────┬────┘
//!          join_all     │         │     (per-source timeout)
//!                ┌──────▼───┐ ┌───▼──────────┐
//!                │  Brave   │ │  Wikipedia   │
//!                │ (keys +  │ │  (key-less)  │
//!                │  retry)  │ │              │
//!                └──────┬───┘ └───┬──────────┘
//!                       │         │   failure → []
//!                       ▼         ▼
//!               merge in provider order, dedupe by url
//! ```
//!
//! A failing source never fails the aggregate; it contributes no results.

mod aggregator;
mod brave;
mod wikipedia;

pub use aggregator::{merge_dedupe, SearchAggregator, SearchReport};
pub use brave::{BraveSource, BRAVE_TAG, DEFAULT_BRAVE_URL};
pub use wikipedia::{WikipediaSource, DEFAULT_WIKIPEDIA_URL, EXTRACT_LIMIT, WIKIPEDIA_TAG};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CallError;

/// One search hit, in the shape the prompt builder and renderers consume
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResult {
    /// Page title
    pub title: String,
    /// Page URL (deduplication key, compared exactly)
    pub url: String,
    /// Short description or snippet
    pub description: String,
    /// Tag of the source that produced this hit
    pub source: String,
    /// Longer extracted text, when the source provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
}

/// Failure of a single search source
#[derive(Debug, Error)]
pub enum SearchError {
    /// Every key for a keyed source failed
    #[error(transparent)]
    Provider(#[from] CallError),

    /// The source answered with a non-2xx status
    #[error("{source_tag} returned HTTP {status}")]
    Http {
        /// Source tag
        source_tag: String,
        /// HTTP status code
        status: u16,
    },

    /// Transport failure
    #[error("{source_tag} request failed: {message}")]
    Request {
        /// Source tag
        source_tag: String,
        /// Underlying error description
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("{source_tag} returned an unexpected response: {message}")]
    Decode {
        /// Source tag
        source_tag: String,
        /// Parse error description
        message: String,
    },
}

/// A provider of search results
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Provider tag stamped on results and used to enable the source
    fn tag(&self) -> &str;

    /// Search for `query`, returning at most `count` results
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SourceResult>, SearchError>;
}
