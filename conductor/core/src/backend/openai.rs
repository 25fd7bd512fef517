//! OpenAI-Compatible Backend
//!
//! Streaming chat completions over the OpenAI wire format, as served by
//! Cerebras, Groq, OpenRouter and most hosted inference APIs.
//!
//! # API
//!
//! - `POST {api_url}` with `Authorization: Bearer <key>`
//! - body `{ "model", "messages": [{ "role", "content" }], "stream": true }`
//! - response: `data: {json}` lines ending with `data: [DONE]`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{ByteStream, CompletionBackend};
use crate::error::ProviderError;
use crate::messages::ChatRequest;

/// Default endpoint
pub const DEFAULT_API_URL: &str = "https://api.cerebras.ai/v1/chat/completions";

/// OpenAI-compatible streaming completion client
#[derive(Clone, Debug)]
pub struct OpenAiCompatBackend {
    /// Provider name
    name: String,
    /// Chat completions endpoint
    api_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a backend for `api_url`
    ///
    /// `timeout` bounds the whole request including the streamed body.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            name: name.into(),
            api_url: api_url.into(),
            http_client,
        })
    }

    /// Chat completions endpoint
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ByteStream, ProviderError> {
        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::network(&self.name, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: self.name.clone(),
                status,
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|e| e.to_string()));

        Ok(stream.boxed())
    }
}
