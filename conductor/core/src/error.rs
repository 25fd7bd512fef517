//! Provider and call errors
//!
//! `ProviderError` is what a single attempt against a provider can fail
//! with. The retry controller folds those into a [`CallError`], which is the
//! only failure type that leaves the orchestration core.

use thiserror::Error;

/// Failure of one attempt against a provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider answered with a non-2xx status
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Transport failure before any fragment was delivered
    #[error("{provider} network error: {message}")]
    Network {
        /// Provider name
        provider: String,
        /// Underlying error description
        message: String,
    },

    /// The attempt observed the cancellation signal
    #[error("request aborted")]
    Aborted,

    /// The stream broke after fragments had already been delivered
    #[error("stream interrupted after {delivered} fragments: {message}")]
    Interrupted {
        /// Fragments delivered before the failure
        delivered: usize,
        /// Underlying error description
        message: String,
    },
}

impl ProviderError {
    /// Build a network error from anything displayable
    pub fn network(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Network {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    /// Whether rotating to the next key and retrying may help
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Network { .. })
    }
}

/// Terminal outcome of a retried provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// Every configured key was tried once and failed
    #[error("all {attempts} API keys for {provider} failed (last error: {last_error})")]
    AllKeysExhausted {
        /// Provider name
        provider: String,
        /// Attempts made (equals the key count)
        attempts: usize,
        /// Description of the final failure
        last_error: String,
    },

    /// Cancelled by the caller
    #[error("request aborted")]
    Aborted,

    /// Stream broke mid-response; not retried to avoid duplicate output
    #[error("stream interrupted after {delivered} fragments: {message}")]
    Interrupted {
        /// Fragments delivered before the failure
        delivered: usize,
        /// Underlying error description
        message: String,
    },
}

impl CallError {
    /// Whether this outcome is a user-initiated stop rather than a failure
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
