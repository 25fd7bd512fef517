//! Conductor Core - Streaming Chat Orchestration
//!
//! This crate is the API orchestration layer of a chat client: it turns user
//! queries into streamed answers from an OpenAI-compatible completion
//! endpoint, optionally grounded in web and Wikipedia search results. It has
//! no UI; a front-end renders the events it emits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Front-end (CLI, GUI, ...)                    │
//! └───────────────┬───────────────────────────────▲──────────────────┘
//!     GenerationRequest / stop                     │ ConductorEvent
//! ┌───────────────▼───────────────────────────────┴──────────────────┐
//! │                           Conductor                               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────────────┐  │
//! │  │ Generation   │  │  Transcript  │  │   Prompt Builder        │  │
//! │  │ Queue        │  │  (history)   │  │   (system + sources)    │  │
//! │  └──────────────┘  └──────────────┘  └─────────────────────────┘  │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────┐   │
//! │  │ CompletionClient             │  │ SearchAggregator         │   │
//! │  │  RetryController + Keys      │  │  Brave | Wikipedia       │   │
//! │  │  SseDecoder                  │  │  (timeout, dedupe)       │   │
//! │  └──────────────────────────────┘  └──────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: session object; submit, stop, search, snapshots
//! - [`GenerationRequest`]: what a caller submits
//! - [`ConductorEvent`]: what a caller receives
//! - [`CredentialSet`] / [`RetryController`]: key rotation with retry
//! - [`SseDecoder`]: chunk-boundary-safe `data:` line decoder
//!
//! # Quick Start
//!
//! ```ignore
//! use chat_conductor::{load_config, Conductor, ConductorEvent, GenerationRequest};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let (tx, mut rx) = mpsc::channel(config.session.event_buffer);
//!     let conductor = Conductor::from_config(&config, tx)?;
//!
//!     conductor.submit_generation(GenerationRequest::new("What is Rust?").with_search(true));
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             ConductorEvent::Token { fragment, .. } => print!("{fragment}"),
//!             ConductorEvent::Settled { .. } => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: completion provider abstraction (OpenAI-compatible)
//! - [`cancel`]: one-shot abort signal
//! - [`completion`]: retrying, decoding completion client
//! - [`conductor`]: main Conductor struct
//! - [`config`]: TOML / environment / CLI configuration
//! - [`credentials`]: API key sets and rotation
//! - [`error`]: provider and call errors
//! - [`events`]: generation requests
//! - [`messages`]: chat messages and Conductor events
//! - [`prompt`]: system prompt and message list construction
//! - [`queue`]: single-flight generation queue
//! - [`retry`]: retry controller and backoff policy
//! - [`search`]: search sources and aggregation
//! - [`session`]: in-memory transcript
//! - [`streaming`]: streaming response decoder

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cancel;
pub mod completion;
pub mod conductor;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod messages;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod search;
pub mod session;
pub mod streaming;

// Re-exports for convenience
pub use backend::{CompletionBackend, OpenAiCompatBackend};
pub use cancel::AbortSignal;
pub use completion::CompletionClient;
pub use conductor::{Conductor, ConductorOptions, Submission, COMPLETION_PROVIDER};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
pub use credentials::{CredentialSet, KeyRotator};
pub use error::{CallError, ProviderError};
pub use events::{Attachment, GenerationRequest, RequestId};
pub use messages::{ChatMessage, ChatRequest, ConductorEvent, GenerationOutcome, MessageRole};
pub use prompt::PromptBuilder;
pub use queue::{Admission, GenerationQueue, QueueState};
pub use retry::{RetryController, RetryPolicy};
pub use search::{SearchAggregator, SearchError, SearchSource, SourceResult};
pub use session::Transcript;
pub use streaming::{decode_stream, SseDecoder, StreamEnd};
