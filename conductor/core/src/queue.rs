//! Generation Queue
//!
//! Single-flight scheduler for generation requests.
//!
//! ```text
//!            submit (Idle)                 settled, queue empty
//!   ┌──────┐ ─────────────► ┌──────┐ ──────────────────────► ┌──────┐
//!   │ Idle │                │ Busy │                         │ Idle │
//!   └──────┘                └──┬───┘ ◄─┐                     └──────┘
//!                 submit (Busy)│       │ settled, pop next
//!                 → enqueue    └───────┘ (stays Busy)
//! ```
//!
//! The queue is a pure state machine. It never runs anything itself; the
//! Conductor's driver loop starts whatever [`Admission::Started`] or
//! [`GenerationQueue::on_request_settled`] hands back.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::events::GenerationRequest;

/// Whether a generation is running
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    /// Nothing running
    #[default]
    Idle,
    /// One generation streaming
    Busy,
}

/// Result of submitting a request
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
    /// The queue was idle; run this request now
    Started(GenerationRequest),
    /// Another request is running; this one waits
    Queued {
        /// 1-based position among waiting requests
        position: usize,
    },
}

/// FIFO of waiting requests plus the busy flag
#[derive(Debug, Default)]
pub struct GenerationQueue {
    state: QueueState,
    pending: VecDeque<GenerationRequest>,
}

impl GenerationQueue {
    /// Create an idle, empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Number of waiting requests (excluding the running one)
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Admit a request
    pub fn submit(&mut self, request: GenerationRequest) -> Admission {
        match self.state {
            QueueState::Idle => {
                self.state = QueueState::Busy;
                Admission::Started(request)
            }
            QueueState::Busy => {
                self.pending.push_back(request);
                Admission::Queued {
                    position: self.pending.len(),
                }
            }
        }
    }

    /// The running request settled; returns the next one to run, if any
    ///
    /// Stays Busy when a request is handed back, goes Idle otherwise.
    pub fn on_request_settled(&mut self) -> Option<GenerationRequest> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.state = QueueState::Idle;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_idle_submit_starts() {
        let mut queue = GenerationQueue::new();
        assert_eq!(queue.state(), QueueState::Idle);

        let request = GenerationRequest::new("a");
        let admission = queue.submit(request.clone());
        assert_eq!(admission, Admission::Started(request));
        assert_eq!(queue.state(), QueueState::Busy);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_busy_submit_queues_with_positions() {
        let mut queue = GenerationQueue::new();
        queue.submit(GenerationRequest::new("a"));

        assert_eq!(
            queue.submit(GenerationRequest::new("b")),
            Admission::Queued { position: 1 }
        );
        assert_eq!(
            queue.submit(GenerationRequest::new("c")),
            Admission::Queued { position: 2 }
        );
        assert_eq!(queue.pending(), 2);
    }

    #[test]
    fn test_settle_drains_fifo() {
        let mut queue = GenerationQueue::new();
        queue.submit(GenerationRequest::new("a"));
        queue.submit(GenerationRequest::new("b"));
        queue.submit(GenerationRequest::new("c"));

        let order: Vec<String> = std::iter::from_fn(|| queue.on_request_settled())
            .map(|r| r.query)
            .collect();
        assert_eq!(order, vec!["b", "c"]);
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[test]
    fn test_settle_keeps_busy_while_pending() {
        let mut queue = GenerationQueue::new();
        queue.submit(GenerationRequest::new("a"));
        queue.submit(GenerationRequest::new("b"));

        assert!(queue.on_request_settled().is_some());
        assert_eq!(queue.state(), QueueState::Busy);
        assert!(queue.on_request_settled().is_none());
        assert_eq!(queue.state(), QueueState::Idle);

        // Idle again: next submit starts immediately
        assert!(matches!(
            queue.submit(GenerationRequest::new("c")),
            Admission::Started(_)
        ));
    }

    #[test]
    fn test_at_most_one_started() {
        let mut queue = GenerationQueue::new();
        let started = (0..10)
            .map(|i| queue.submit(GenerationRequest::new(format!("q{i}"))))
            .filter(|a| matches!(a, Admission::Started(_)))
            .count();
        assert_eq!(started, 1);
        assert_eq!(queue.pending(), 9);
    }
}
