//! Retry Controller
//!
//! Wraps a provider call and retries it with the next API key on
//! recoverable failures. Each key gets exactly one trial per call, so the
//! worst case is `keys.len()` attempts.
//!
//! ```text
//! attempt 0 ── key[i] ──► fail (HTTP/network) ──► rotate ──► backoff
//! attempt 1 ── key[i+1] ─► fail ───────────────► rotate ──► backoff
//!   ...
//! attempt K-1 ────────────► fail ──────────────► AllKeysExhausted
//! ```
//!
//! Cancellation short-circuits without rotating and without consuming an
//! attempt. A stream that breaks after delivering fragments is returned
//! as-is instead of being replayed with another key.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::AbortSignal;
use crate::credentials::CredentialSet;
use crate::error::{CallError, ProviderError};

// ============================================================================
// Backoff Policy
// ============================================================================

/// Delay between attempts
///
/// The default is an immediate retry with the next key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry (0 = retry immediately)
    pub initial_backoff_ms: u64,

    /// Maximum delay between attempts
    pub max_backoff_ms: u64,

    /// Growth factor applied per attempt
    pub backoff_multiplier: f32,

    /// Add up to 25% random jitter
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration after failed attempt N (0-indexed)
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_backoff_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * f64::from(self.backoff_multiplier).powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64);

        let duration_ms = if self.use_jitter {
            let jitter = rand::random::<f64>() * 0.25;
            (capped * (1.0 + jitter)) as u64
        } else {
            capped as u64
        };

        Duration::from_millis(duration_ms)
    }
}

// ============================================================================
// Retry Controller
// ============================================================================

/// Retries a provider call across a provider's keys
#[derive(Clone, Debug, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    /// Create a controller with the given backoff policy
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `call` with the current key, rotating and retrying on
    /// recoverable failures
    ///
    /// # Errors
    ///
    /// - [`CallError::Aborted`] if `cancel` fires before or between attempts,
    ///   or the attempt itself reports [`ProviderError::Aborted`]
    /// - [`CallError::Interrupted`] if a stream broke after delivering output
    /// - [`CallError::AllKeysExhausted`] once every key has failed once
    pub async fn call<T, F, Fut>(
        &self,
        credentials: &CredentialSet,
        cancel: &AbortSignal,
        mut call: F,
    ) -> Result<T, CallError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = credentials.len();
        let mut attempt = 0;
        let mut last_error = String::new();

        while attempt < max_attempts {
            if cancel.is_signalled() {
                return Err(CallError::Aborted);
            }

            let key = credentials.current_key();
            tracing::debug!(
                provider = %credentials.provider(),
                attempt,
                index = credentials.index(),
                "Calling provider"
            );

            match call(key).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(
                        provider = %credentials.provider(),
                        attempt,
                        error = %err,
                        "Provider call failed, rotating key"
                    );
                    last_error = err.to_string();
                    credentials.rotate();
                    attempt += 1;

                    if attempt < max_attempts {
                        self.wait(attempt - 1, cancel).await?;
                    }
                }
                Err(ProviderError::Interrupted { delivered, message }) => {
                    tracing::warn!(
                        provider = %credentials.provider(),
                        delivered,
                        error = %message,
                        "Stream interrupted mid-response, not retrying"
                    );
                    return Err(CallError::Interrupted { delivered, message });
                }
                // Only `Aborted` is left
                Err(_) => return Err(CallError::Aborted),
            }
        }

        Err(CallError::AllKeysExhausted {
            provider: credentials.provider().to_string(),
            attempts: attempt,
            last_error,
        })
    }

    /// Sleep for the backoff of `attempt`, waking early on cancellation
    async fn wait(&self, attempt: usize, cancel: &AbortSignal) -> Result<(), CallError> {
        let delay = self
            .policy
            .backoff_for_attempt(u32::try_from(attempt).unwrap_or(u32::MAX));
        if delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            () = cancel.signalled() => Err(CallError::Aborted),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
