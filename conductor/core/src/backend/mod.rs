//! Completion Backend Integration
//!
//! Abstracted access to streaming chat completion providers through a common
//! trait.
//!
//! # Available Backends
//!
//! - **OpenAI-compatible**: any `/v1/chat/completions` endpoint that streams
//!   `data:` lines (Cerebras by default)
//!
//! # Usage
//!
//! ```ignore
//! use chat_conductor::backend::{CompletionBackend, OpenAiCompatBackend};
//!
//! let backend = OpenAiCompatBackend::new("cerebras", url, timeout)?;
//! let body = backend.open_stream(&request, &api_key).await?;
//! ```

mod openai;
mod traits;

pub use openai::{OpenAiCompatBackend, DEFAULT_API_URL};
pub use traits::{ByteStream, CompletionBackend};
