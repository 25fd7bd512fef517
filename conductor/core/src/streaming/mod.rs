//! Streaming Infrastructure
//!
//! Turns the byte stream of a completion response into ordered text
//! fragments.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  bytes   ┌──────────────┐  lines   ┌──────────────┐
//! │ HTTP body    │ ───────► │  SseDecoder  │ ───────► │  on_token()  │
//! │ (chunks)     │          │ (partial-line│          │  (fragment)  │
//! └──────────────┘          │   buffer)    │          └──────────────┘
//!                           └──────┬───────┘
//!                                  │ data: [DONE]
//!                                  ▼
//!                            StreamEnd::Finished
//! ```
//!
//! [`SseDecoder`] is a pure state machine over bytes; [`decode_stream`] drives
//! it from an async byte stream and observes cancellation between reads.

mod decoder;

pub use decoder::{
    decode_chunks, decode_stream, DecodeSummary, SseDecoder, StreamEnd, StreamReadError,
    DATA_PREFIX, DONE_SENTINEL,
};
