//! Generation Cancellation
//!
//! One [`AbortSignal`] is created per generation request. The retry
//! controller checks it before every attempt and while backing off; the
//! stream decoder races every chunk read against it. Signalling is one-shot:
//! the first `signal()` wins and later calls are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Cooperative, one-shot abort signal shared between a caller and a
/// generation pipeline
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a fresh, unsignalled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation
    ///
    /// Returns `true` only for the call that actually fired the signal.
    pub fn signal(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        if first {
            self.token.cancel();
        }
        first
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal fires
    pub async fn signalled(&self) {
        self.token.cancelled().await;
    }
}
