//! Completion Backend Traits
//!
//! Trait definitions for streaming chat completion providers. The
//! Conductor only needs one capability from a provider: open a streaming
//! response for a request with a given API key and hand back the raw body.
//! Decoding, retries and key rotation happen above this seam.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ProviderError;
use crate::messages::ChatRequest;

/// Raw response body chunks; errors are transport failures
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, String>>;

/// Streaming chat completion provider
///
/// Implementations must map non-2xx responses to [`ProviderError::Http`]
/// and connection failures to [`ProviderError::Network`] so the retry
/// controller can rotate keys.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Provider name (used for credential lookup and logs)
    fn name(&self) -> &str;

    /// Send `request` authenticated with `api_key` and return the body stream
    async fn open_stream(
        &self,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ByteStream, ProviderError>;
}
