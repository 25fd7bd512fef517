//! Streaming Completion Client
//!
//! Glues a [`CompletionBackend`] to its [`CredentialSet`] through the
//! [`RetryController`], and decodes the winning response into fragments.
//!
//! A failure before the first fragment is retried with the next key. Once
//! any fragment reached the caller, a broken stream is terminal: replaying
//! the request with another key would resend text the caller already shows.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::CompletionBackend;
use crate::cancel::AbortSignal;
use crate::credentials::CredentialSet;
use crate::error::{CallError, ProviderError};
use crate::messages::ChatRequest;
use crate::retry::RetryController;
use crate::streaming::{decode_stream, DecodeSummary, StreamEnd};

/// Completion provider plus its keys and retry policy
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    credentials: Arc<CredentialSet>,
    retry: RetryController,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("backend", &self.backend.name())
            .field("keys", &self.credentials.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl CompletionClient {
    /// Create a client
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        credentials: Arc<CredentialSet>,
        retry: RetryController,
    ) -> Self {
        Self {
            backend,
            credentials,
            retry,
        }
    }

    /// Provider credentials (shared rotation state)
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialSet> {
        &self.credentials
    }

    /// Stream a completion, calling `on_token` with each fragment in order
    ///
    /// # Errors
    ///
    /// - [`CallError::Aborted`] when `cancel` fires (fragments already passed
    ///   to `on_token` stay with the caller)
    /// - [`CallError::Interrupted`] when the stream breaks mid-response
    /// - [`CallError::AllKeysExhausted`] when every key failed
    pub async fn stream<F>(
        &self,
        request: &ChatRequest,
        cancel: &AbortSignal,
        on_token: F,
    ) -> Result<DecodeSummary, CallError>
    where
        F: FnMut(&str) + Send,
    {
        let sink = Mutex::new(on_token);
        let sink = &sink;
        let backend = self.backend.as_ref();

        self.retry
            .call(&self.credentials, cancel, move |key| async move {
                let body = tokio::select! {
                    biased;
                    () = cancel.signalled() => return Err(ProviderError::Aborted),
                    opened = backend.open_stream(request, &key) => opened?,
                };

                let decoded = decode_stream(body, cancel, |fragment| {
                    let mut on_token = sink.lock();
                    on_token(fragment);
                })
                .await;

                match decoded {
                    Ok(summary) if summary.end == StreamEnd::Aborted => Err(ProviderError::Aborted),
                    Ok(summary) => {
                        tracing::debug!(
                            provider = %backend.name(),
                            fragments = summary.fragments,
                            skipped = summary.skipped_lines,
                            end = ?summary.end,
                            "Completion stream finished"
                        );
                        Ok(summary)
                    }
                    Err(e) if e.delivered == 0 => {
                        Err(ProviderError::network(backend.name(), e.message))
                    }
                    Err(e) => Err(ProviderError::Interrupted {
                        delivered: e.delivered,
                        message: e.message,
                    }),
                }
            })
            .await
    }
}
