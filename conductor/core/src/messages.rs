//! Conductor Messages
//!
//! Chat messages sent to the completion provider, and events sent from the
//! Conductor back to the caller while a generation runs.
//!
//! Callers are renderers: they append `Token` fragments as they arrive and
//! label the final result from `Settled`. They never see retry or rotation
//! details.

use serde::{Deserialize, Serialize};

use crate::events::RequestId;
use crate::search::SourceResult;

// ============================================================================
// Chat Messages
// ============================================================================

/// Message role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model
    System,
    /// User input
    User,
    /// Model output
    Assistant,
}

/// A role-tagged chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body of a streaming chat completion request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Ordered conversation
    pub messages: Vec<ChatMessage>,
    /// Always true for generation requests
    pub stream: bool,
}

impl ChatRequest {
    /// Create a streaming request
    pub fn streaming(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

// ============================================================================
// Conductor Events
// ============================================================================

/// How a generation ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationOutcome {
    /// The full response was received
    Completed {
        /// Complete response text
        text: String,
    },
    /// Stopped by the caller; text delivered so far is preserved
    Stopped {
        /// Fragments delivered before the stop, concatenated
        partial: String,
    },
    /// Every key failed, or the stream broke mid-response
    Failed {
        /// Error description
        error: String,
        /// Fragments delivered before the failure, concatenated
        partial: String,
    },
}

impl GenerationOutcome {
    /// Final (or partial) text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { text } => text,
            Self::Stopped { partial } | Self::Failed { partial, .. } => partial,
        }
    }

    /// Whether the caller stopped this generation
    #[must_use]
    pub fn was_aborted(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Whether this generation failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Events from the Conductor to the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConductorEvent {
    /// The request was accepted while another generation runs
    Queued {
        /// Queued request
        request_id: RequestId,
        /// 1-based position in the pending queue
        position: usize,
    },

    /// The request became the active generation
    Started {
        /// Active request
        request_id: RequestId,
    },

    /// Search results gathered for the request
    Sources {
        /// Request the sources belong to
        request_id: RequestId,
        /// Deduplicated results in citation order
        sources: Vec<SourceResult>,
    },

    /// An incremental piece of the response
    Token {
        /// Request the fragment belongs to
        request_id: RequestId,
        /// Fragment text
        fragment: String,
    },

    /// The request finished (success, stop or failure)
    Settled {
        /// Settled request
        request_id: RequestId,
        /// How it ended
        outcome: GenerationOutcome,
    },
}

impl ConductorEvent {
    /// Request this event belongs to
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Queued { request_id, .. }
            | Self::Started { request_id }
            | Self::Sources { request_id, .. }
            | Self::Token { request_id, .. }
            | Self::Settled { request_id, .. } => request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_wire_format() {
        let request = ChatRequest::streaming(
            "llama-3.3-70b",
            vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama-3.3-70b");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_outcome_accessors() {
        let done = GenerationOutcome::Completed { text: "Hello".into() };
        assert_eq!(done.text(), "Hello");
        assert!(!done.was_aborted());

        let stopped = GenerationOutcome::Stopped {
            partial: "Hel".into(),
        };
        assert_eq!(stopped.text(), "Hel");
        assert!(stopped.was_aborted());

        let failed = GenerationOutcome::Failed {
            error: "all keys failed".into(),
            partial: String::new(),
        };
        assert!(failed.is_failure());
        assert!(!failed.was_aborted());
    }
}
