//! Prompt Builder
//!
//! Turns a [`GenerationRequest`] plus its context into the role-tagged
//! message list sent to the completion provider:
//!
//! ```text
//! [system]    date/time, identity, capabilities, instructions
//!             + study mode + custom instructions
//!             + numbered search results / search failure note
//! [history]   last `history_window` transcript messages
//! [user]      query + attachment block
//! ```

use chrono::{DateTime, Local};

use crate::events::{Attachment, GenerationRequest};
use crate::messages::ChatMessage;
use crate::search::SourceResult;

const IDENTITY: &str = "You are a helpful AI assistant.";

const CAPABILITIES: &str = "\
Capabilities:
1. **Diagrams**: You can generate diagrams, flowcharts, graphs, and visualizations using Mermaid.js. When a user asks for a diagram, output a code block with the language set to `mermaid`.
   Example:
   ```mermaid
   graph TD;
     A-->B;
   ```
2. **Math & Science**: You can render mathematical and chemical formulas using LaTeX. Use standard LaTeX delimiters: $ for inline math and $$ for display math.
   Example: The area is $A = \\pi r^2$.

3. **Attachments**: The user may provide text from attached files. Use this context to answer questions.

Instructions:
- If the user asks to \"draw\" or \"visualize\" something, ALWAYS provide a Mermaid diagram if possible.
- Be concise and helpful.
";

const STUDY_MODE: &str = "\
Study Mode:
- Act as a patient tutor. Guide the user toward the answer step by step instead of only stating it.
- Check understanding with a short question at the end of each explanation.
- Prefer worked examples and simple analogies.
";

const SEARCH_INTRO: &str = "Use the following search results to answer the user's question:";
const CITATION_INSTRUCTION: &str = "Cite the sources using [number] notation where appropriate.";
const SEARCH_FAILED: &str = "(Web search failed, please answer based on internal knowledge)";
const NO_SEARCH: &str = "Answer the user's question to the best of your ability.";

/// What the search step produced for this request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchContext<'a> {
    /// Search disabled, or no results
    None,
    /// Results to cite, in citation order
    Results(&'a [SourceResult]),
    /// Search was attempted and every source failed
    Failed,
}

impl<'a> SearchContext<'a> {
    /// Context for a set of results; an empty set cites nothing
    #[must_use]
    pub fn from_results(results: &'a [SourceResult], all_failed: bool) -> Self {
        if all_failed {
            Self::Failed
        } else if results.is_empty() {
            Self::None
        } else {
            Self::Results(results)
        }
    }
}

/// Builds system prompts and message lists
#[derive(Clone, Debug, Default)]
pub struct PromptBuilder {
    custom_instructions: Option<String>,
    history_window: usize,
}

impl PromptBuilder {
    /// Create a builder feeding the last `history_window` messages
    #[must_use]
    pub fn new(history_window: usize) -> Self {
        Self {
            custom_instructions: None,
            history_window,
        }
    }

    /// User-supplied instructions appended to every system prompt
    #[must_use]
    pub fn with_custom_instructions(mut self, instructions: Option<String>) -> Self {
        self.custom_instructions = instructions
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());
        self
    }

    /// System prompt for one request
    #[must_use]
    pub fn system_prompt(
        &self,
        request: &GenerationRequest,
        search: SearchContext<'_>,
        now: DateTime<Local>,
    ) -> String {
        let mut prompt = format!(
            "Current Date and Time: {}. {IDENTITY}\n\n{CAPABILITIES}",
            now.format("%A, %B %-d, %Y %H:%M:%S")
        );

        if request.study_mode {
            prompt.push('\n');
            prompt.push_str(STUDY_MODE);
        }

        if let Some(instructions) = &self.custom_instructions {
            prompt.push_str("\n\nUSER CUSTOM INSTRUCTIONS (MUST FOLLOW):\n");
            prompt.push_str(instructions);
            prompt.push('\n');
        }

        match search {
            SearchContext::Results(results) => {
                prompt.push_str("\n\n");
                prompt.push_str(SEARCH_INTRO);
                prompt.push('\n');
                prompt.push_str(&format_sources(results));
                prompt.push_str(CITATION_INSTRUCTION);
            }
            SearchContext::Failed => {
                prompt.push('\n');
                prompt.push_str(SEARCH_FAILED);
            }
            SearchContext::None => {
                prompt.push(' ');
                prompt.push_str(NO_SEARCH);
            }
        }

        prompt
    }

    /// Full message list: system prompt, history window, user turn
    #[must_use]
    pub fn build_messages(
        &self,
        request: &GenerationRequest,
        history: &[ChatMessage],
        search: SearchContext<'_>,
        now: DateTime<Local>,
    ) -> Vec<ChatMessage> {
        let start = history.len().saturating_sub(self.history_window);

        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(ChatMessage::system(self.system_prompt(request, search, now)));
        messages.extend_from_slice(&history[start..]);
        messages.push(ChatMessage::user(user_turn(request)));
        messages
    }
}

/// Numbered `[n] title: description` blocks, 1-based
#[must_use]
pub fn format_sources(results: &[SourceResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}: {}\nURL: {}\n\n", i + 1, r.title, r.description, r.url))
        .collect()
}

/// User message content: the query plus any attachment text
#[must_use]
pub fn user_turn(request: &GenerationRequest) -> String {
    match &request.attachment {
        Some(attachment) => format!("{}{}", request.query, attachment_block(attachment)),
        None => request.query.clone(),
    }
}

fn attachment_block(attachment: &Attachment) -> String {
    match &attachment.text {
        Some(text) => format!(
            "\n\n--- Attachment Content ({}) ---\n{text}\n--- End Attachment ---\n",
            attachment.name
        ),
        None => format!(
            "\n\n[System: Failed to read attachment: {}]",
            attachment.name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap()
    }

    fn source(n: usize) -> SourceResult {
        SourceResult {
            title: format!("Title {n}"),
            url: format!("https://example.com/{n}"),
            description: format!("Description {n}"),
            source: "brave".into(),
            full_content: None,
        }
    }

    #[test]
    fn test_prompt_starts_with_date() {
        let prompt = PromptBuilder::new(10).system_prompt(
            &GenerationRequest::new("hi"),
            SearchContext::None,
            now(),
        );
        assert!(prompt.starts_with("Current Date and Time: Saturday, March 9, 2024 14:05:00."));
        assert!(prompt.contains("Mermaid"));
        assert!(prompt.ends_with(NO_SEARCH));
        assert!(!prompt.contains("Study Mode"));
    }

    #[test]
    fn test_sources_are_numbered_from_one() {
        let results = vec![source(1), source(2)];
        let prompt = PromptBuilder::new(10).system_prompt(
            &GenerationRequest::new("hi"),
            SearchContext::Results(&results),
            now(),
        );

        assert!(prompt.contains(
            "[1] Title 1: Description 1\nURL: https://example.com/1\n\n[2] Title 2: Description 2\nURL: https://example.com/2\n\n"
        ));
        assert!(prompt.ends_with(CITATION_INSTRUCTION));
        assert!(!prompt.contains(NO_SEARCH));
    }

    #[test]
    fn test_search_failure_note() {
        let prompt = PromptBuilder::new(10).system_prompt(
            &GenerationRequest::new("hi"),
            SearchContext::Failed,
            now(),
        );
        assert!(prompt.ends_with(SEARCH_FAILED));
    }

    #[test]
    fn test_search_context_from_results() {
        let results = vec![source(1)];
        assert_eq!(SearchContext::from_results(&[], false), SearchContext::None);
        assert_eq!(SearchContext::from_results(&[], true), SearchContext::Failed);
        assert_eq!(
            SearchContext::from_results(&results, false),
            SearchContext::Results(&results)
        );
    }

    #[test]
    fn test_study_mode_and_custom_instructions() {
        let builder =
            PromptBuilder::new(10).with_custom_instructions(Some("  Answer in French.  ".into()));
        let prompt = builder.system_prompt(
            &GenerationRequest::new("hi").with_study_mode(true),
            SearchContext::None,
            now(),
        );

        let study = prompt.find("Study Mode").unwrap();
        let custom = prompt
            .find("USER CUSTOM INSTRUCTIONS (MUST FOLLOW):\nAnswer in French.\n")
            .unwrap();
        assert!(study < custom);
    }

    #[test]
    fn test_blank_custom_instructions_are_ignored() {
        let builder = PromptBuilder::new(10).with_custom_instructions(Some("   ".into()));
        let prompt = builder.system_prompt(&GenerationRequest::new("hi"), SearchContext::None, now());
        assert!(!prompt.contains("USER CUSTOM INSTRUCTIONS"));
    }

    #[test]
    fn test_history_window() {
        let history: Vec<ChatMessage> = (0..6)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("q{i}"))
                } else {
                    ChatMessage::assistant(format!("a{i}"))
                }
            })
            .collect();

        let messages = PromptBuilder::new(4).build_messages(
            &GenerationRequest::new("latest"),
            &history,
            SearchContext::None,
            now(),
        );

        let contents: Vec<_> = messages.iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q2", "a3", "q4", "a5", "latest"]);
        assert_eq!(messages[0].role, crate::messages::MessageRole::System);
    }

    #[test]
    fn test_short_history_is_kept_whole() {
        let history = vec![ChatMessage::user("q"), ChatMessage::assistant("a")];
        let messages = PromptBuilder::new(10).build_messages(
            &GenerationRequest::new("next"),
            &history,
            SearchContext::None,
            now(),
        );
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn test_attachment_block() {
        let request = GenerationRequest::new("Summarise this")
            .with_attachment(Attachment::new("notes.pdf", "Borrowing rules"));
        assert_eq!(
            user_turn(&request),
            "Summarise this\n\n--- Attachment Content (notes.pdf) ---\nBorrowing rules\n--- End Attachment ---\n"
        );

        let unreadable =
            GenerationRequest::new("Read it").with_attachment(Attachment::unreadable("scan.pdf"));
        assert_eq!(
            user_turn(&unreadable),
            "Read it\n\n[System: Failed to read attachment: scan.pdf]"
        );

        assert_eq!(user_turn(&GenerationRequest::new("plain")), "plain");
    }
}
