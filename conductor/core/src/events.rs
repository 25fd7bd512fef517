//! Generation Requests
//!
//! What a caller submits to the Conductor. A request is immutable once
//! submitted and is consumed exactly once by the generation queue.

use serde::{Deserialize, Serialize};

/// Generation request identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new unique request ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("gen_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// File content attached to a query
///
/// Text extraction (PDF, archives, ...) happens before submission; the core
/// only forwards the extracted text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name of the attached file
    pub name: String,
    /// Extracted text, or `None` if extraction failed
    pub text: Option<String>,
}

impl Attachment {
    /// Create an attachment with extracted text
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
        }
    }

    /// Create an attachment whose text could not be extracted
    pub fn unreadable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
        }
    }
}

/// A user query waiting to be answered
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Unique request ID
    pub id: RequestId,
    /// The user's query
    pub query: String,
    /// Model identifier (empty = configured default)
    pub model: String,
    /// Run a web search before answering
    pub search_enabled: bool,
    /// Answer in tutoring style
    pub study_mode: bool,
    /// Attached file content
    pub attachment: Option<Attachment>,
}

impl GenerationRequest {
    /// Create a request with a fresh ID
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            query: query.into(),
            model: String::new(),
            search_enabled: false,
            study_mode: false,
            attachment: None,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Enable or disable web search
    #[must_use]
    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    /// Enable or disable study mode
    #[must_use]
    pub fn with_study_mode(mut self, enabled: bool) -> Self {
        self.study_mode = enabled;
        self
    }

    /// Attach file content
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Whether a search should run for this request
    #[must_use]
    pub fn wants_search(&self) -> bool {
        self.search_enabled && !self.query.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("What is Rust?")
            .with_model("llama-3.3-70b")
            .with_search(true)
            .with_study_mode(true)
            .with_attachment(Attachment::new("notes.pdf", "ownership"));

        assert_eq!(request.query, "What is Rust?");
        assert_eq!(request.model, "llama-3.3-70b");
        assert!(request.search_enabled);
        assert!(request.study_mode);
        assert_eq!(request.attachment.unwrap().text.as_deref(), Some("ownership"));
    }

    #[test]
    fn test_blank_query_skips_search() {
        assert!(!GenerationRequest::new("   ").with_search(true).wants_search());
        assert!(!GenerationRequest::new("rust").wants_search());
        assert!(GenerationRequest::new("rust").with_search(true).wants_search());
    }

    #[test]
    fn test_request_ids_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("gen_"));
    }
}
