//! Session Transcript
//!
//! In-memory message history of one conversation. The Conductor appends the
//! user turn when a generation starts and the assistant turn when it
//! settles; the prompt builder reads back a window of the most recent
//! messages.
//!
//! The transcript is never persisted. Storing chats is up to the caller,
//! which receives every settled outcome through the event channel anyway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{ChatMessage, GenerationOutcome, MessageRole};
use crate::search::SourceResult;

/// Maximum title length in characters before truncation
pub const TITLE_MAX_CHARS: usize = 30;

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Role and content as sent to the provider
    pub message: ChatMessage,
    /// Sources cited by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceResult>,
    /// Assistant message was cut short by a stop
    #[serde(default)]
    pub aborted: bool,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

/// Ordered conversation history
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Record a user turn
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content), Vec::new(), false);
    }

    /// Record an assistant turn
    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
        sources: Vec<SourceResult>,
        aborted: bool,
    ) {
        self.push(ChatMessage::assistant(content), sources, aborted);
    }

    /// Record how a generation settled
    ///
    /// Completed responses are recorded. Stopped responses are recorded with
    /// their partial text when any arrived. Failures are not recorded.
    /// Returns whether an entry was added.
    pub fn record_outcome(&mut self, outcome: &GenerationOutcome, sources: Vec<SourceResult>) -> bool {
        match outcome {
            GenerationOutcome::Completed { text } => {
                self.push_assistant(text.clone(), sources, false);
                true
            }
            GenerationOutcome::Stopped { partial } if !partial.is_empty() => {
                self.push_assistant(partial.clone(), sources, true);
                true
            }
            GenerationOutcome::Stopped { .. } | GenerationOutcome::Failed { .. } => false,
        }
    }

    /// The last `n` messages, oldest first
    #[must_use]
    pub fn window(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..]
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.window(self.entries.len())
    }

    /// Chat title: the first user message, truncated
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.message.role == MessageRole::User)
            .map(|e| truncate_title(&e.message.content))
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, message: ChatMessage, sources: Vec<SourceResult>, aborted: bool) {
        self.entries.push(TranscriptEntry {
            message,
            sources,
            aborted,
            timestamp: Utc::now(),
        });
    }
}

fn truncate_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_window_returns_most_recent() {
        let mut transcript = Transcript::new();
        for i in 0..5 {
            transcript.push_user(format!("q{i}"));
            transcript.push_assistant(format!("a{i}"), Vec::new(), false);
        }

        let window = transcript.window(3);
        let contents: Vec<_> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a3", "q4", "a4"]);

        assert_eq!(transcript.window(100).len(), 10);
        assert!(transcript.window(0).is_empty());
    }

    #[test]
    fn test_title_truncation() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.title(), None);

        transcript.push_user("Explain the borrow checker in detail please");
        assert_eq!(
            transcript.title().as_deref(),
            Some("Explain the borrow checker in ...")
        );

        let mut short = Transcript::new();
        short.push_user("Hi there");
        assert_eq!(short.title().as_deref(), Some("Hi there"));
    }

    #[test]
    fn test_title_counts_characters() {
        let mut transcript = Transcript::new();
        let exactly_thirty = "é".repeat(TITLE_MAX_CHARS);
        transcript.push_user(exactly_thirty.clone());
        assert_eq!(transcript.title(), Some(exactly_thirty));
    }

    #[test]
    fn test_record_outcome() {
        let mut transcript = Transcript::new();
        transcript.push_user("q");

        assert!(transcript.record_outcome(
            &GenerationOutcome::Completed { text: "full".into() },
            Vec::new()
        ));
        assert!(transcript.record_outcome(
            &GenerationOutcome::Stopped {
                partial: "par".into()
            },
            Vec::new()
        ));
        assert!(!transcript.record_outcome(
            &GenerationOutcome::Stopped {
                partial: String::new()
            },
            Vec::new()
        ));
        assert!(!transcript.record_outcome(
            &GenerationOutcome::Failed {
                error: "boom".into(),
                partial: "x".into()
            },
            Vec::new()
        ));

        assert_eq!(transcript.len(), 3);
        assert!(!transcript.entries()[1].aborted);
        assert!(transcript.entries()[2].aborted);
        assert_eq!(transcript.entries()[2].message.content, "par");
    }
}
