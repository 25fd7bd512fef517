//! Server-Sent-Events Decoder
//!
//! Completion endpoints answer with newline-delimited events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//! data: [DONE]
//! ```
//!
//! Network chunks do not respect line (or UTF-8 character) boundaries, so
//! the decoder keeps the trailing partial line as raw bytes and only decodes
//! complete lines. Feeding the same bytes split at any offsets yields the
//! same fragments.

use std::fmt::Display;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;

use crate::cancel::AbortSignal;

/// Prefix of every data line
pub const DATA_PREFIX: &str = "data: ";

/// Line marking the intentional end of a completion stream
pub const DONE_SENTINEL: &str = "data: [DONE]";

/// Minimum buffer capacity for the decoder
const MIN_BUFFER_CAPACITY: usize = 1024;

// ============================================================================
// Wire Payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract `choices[0].delta.content` from one event payload
fn extract_content(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: ChunkPayload = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|c| !c.is_empty()))
}

// ============================================================================
// Incremental Decoder
// ============================================================================

/// Incremental line decoder for one completion stream
#[derive(Debug)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line
    buffer: Vec<u8>,
    /// Whether the terminal sentinel has been seen
    finished: bool,
    /// Malformed data lines skipped so far
    skipped: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    /// Create a decoder with an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            finished: false,
            skipped: 0,
        }
    }

    /// Whether `data: [DONE]` has been seen
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Malformed data lines skipped so far
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes of the pending partial line
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return the fragments of every line it completed
    ///
    /// Input after the terminal sentinel is ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut fragments = Vec::new();
        if self.finished {
            return fragments;
        }

        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;

            self.process_line(&line, &mut fragments);
            if self.finished {
                self.buffer.clear();
                return fragments;
            }
        }

        self.buffer.drain(..start);
        fragments
    }

    /// Close the stream at end of data
    ///
    /// An unterminated trailing line is discarded; only a trailing
    /// `data: [DONE]` still counts as the sentinel.
    pub fn finish(&mut self) {
        if self.finished || self.buffer.is_empty() {
            self.buffer.clear();
            return;
        }

        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        if line.trim() == DONE_SENTINEL {
            self.finished = true;
        } else if !line.trim().is_empty() {
            tracing::debug!(bytes = line.len(), "Discarding unterminated trailing line");
        }
    }

    fn process_line(&mut self, raw: &str, fragments: &mut Vec<String>) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        if line == DONE_SENTINEL {
            self.finished = true;
            return;
        }

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            // Comments, event names, keep-alives
            return;
        };

        match extract_content(payload) {
            Ok(Some(content)) => fragments.push(content),
            Ok(None) => {}
            Err(e) => {
                self.skipped += 1;
                tracing::debug!(error = %e, line = %line, "Skipping malformed stream line");
            }
        }
    }
}

/// Decode a complete chunk sequence into its fragments
pub fn decode_chunks<'a, I>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut decoder = SseDecoder::new();
    let mut fragments = Vec::new();
    for chunk in chunks {
        fragments.extend(decoder.push(chunk));
        if decoder.is_finished() {
            return fragments;
        }
    }
    decoder.finish();
    fragments
}

// ============================================================================
// Async Driver
// ============================================================================

/// Why decoding stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// Terminal sentinel seen
    Finished,
    /// Source ended without a sentinel (still a normal completion)
    EndOfStream,
    /// Cancellation signal observed
    Aborted,
}

/// Result of consuming one stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Why decoding stopped
    pub end: StreamEnd,
    /// Fragments handed to the callback
    pub fragments: usize,
    /// Malformed lines skipped
    pub skipped_lines: usize,
}

/// The byte source failed mid-stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("stream read failed after {delivered} fragments: {message}")]
pub struct StreamReadError {
    /// Fragments delivered before the failure
    pub delivered: usize,
    /// Underlying error description
    pub message: String,
}

/// Consume `stream` until the sentinel, end of data or cancellation,
/// invoking `on_token` with each fragment in order
///
/// Once `cancel` fires no further fragment is delivered.
///
/// # Errors
///
/// Returns [`StreamReadError`] if the byte source yields an error.
pub async fn decode_stream<S, E, F>(
    mut stream: S,
    cancel: &AbortSignal,
    mut on_token: F,
) -> Result<DecodeSummary, StreamReadError>
where
    S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
    E: Display,
    F: FnMut(&str),
{
    let mut decoder = SseDecoder::new();
    let mut delivered = 0;

    let summary = |end, delivered, decoder: &SseDecoder| DecodeSummary {
        end,
        fragments: delivered,
        skipped_lines: decoder.skipped(),
    };

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.signalled() => {
                return Ok(summary(StreamEnd::Aborted, delivered, &decoder));
            }
            item = stream.next() => item,
        };

        let fragments = match next {
            Some(Ok(bytes)) => decoder.push(&bytes),
            Some(Err(e)) => {
                return Err(StreamReadError {
                    delivered,
                    message: e.to_string(),
                });
            }
            None => {
                decoder.finish();
                let end = if decoder.is_finished() {
                    StreamEnd::Finished
                } else {
                    StreamEnd::EndOfStream
                };
                return Ok(summary(end, delivered, &decoder));
            }
        };

        for fragment in &fragments {
            if cancel.is_signalled() {
                return Ok(summary(StreamEnd::Aborted, delivered, &decoder));
            }
            on_token(fragment);
            delivered += 1;
        }

        if decoder.is_finished() {
            return Ok(summary(StreamEnd::Finished, delivered, &decoder));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    const HELLO: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
                         data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\
                         data: [DONE]\n";

    fn chunks_of(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut last = 0;
        for &cut in cuts {
            out.push(bytes[last..cut].to_vec());
            last = cut;
        }
        out.push(bytes[last..].to_vec());
        out
    }

    #[test]
    fn test_single_chunk() {
        let fragments = decode_chunks([HELLO.as_bytes()]);
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_split_across_five_boundaries() {
        let bytes = HELLO.as_bytes();
        let chunks = chunks_of(bytes, &[3, 17, 40, 61, 90]);
        assert_eq!(chunks.len(), 6);
        let fragments = decode_chunks(chunks.iter().map(Vec::as_slice));
        assert_eq!(fragments, vec!["Hel", "lo"]);
        assert_eq!(fragments.concat(), "Hello");
    }

    #[test]
    fn test_byte_by_byte() {
        let fragments = decode_chunks(HELLO.as_bytes().chunks(1));
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_multibyte_character_split() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo ✓\"}}]}\n";
        let fragments = decode_chunks(body.as_bytes().chunks(1));
        assert_eq!(fragments, vec!["héllo ✓"]);
    }

    #[test]
    fn test_stops_at_sentinel() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: [DONE]\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec!["a"]);
        assert!(decoder.is_finished());
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n").is_empty());
    }

    #[test]
    fn test_malformed_line_skipped() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: {not json}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec!["a", "b"]);
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn test_ignores_blank_comment_and_empty_delta_lines() {
        let body = "\r\n: keep-alive\n\
                    event: message\n\
                    data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
                    data: {\"choices\":[]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n";
        assert_eq!(decode_chunks([body.as_bytes()]), vec!["x"]);
    }

    #[test]
    fn test_partial_line_kept_until_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}")
            .is_empty());
        assert!(decoder.pending() > 0);
        assert_eq!(decoder.push(b"]}\n"), vec!["hi"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_unterminated_trailing_line_discarded() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        assert_eq!(decode_chunks([body.as_bytes()]), vec!["a"]);

        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec!["a"]);
        decoder.finish();
        assert_eq!(decoder.pending(), 0);
        assert!(!decoder.is_finished());
    }

    #[test]
    fn test_unterminated_sentinel_still_finishes() {
        let mut decoder = SseDecoder::new();
        assert_eq!(
            decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: [DONE]"),
            vec!["a"]
        );
        assert!(!decoder.is_finished());
        decoder.finish();
        assert!(decoder.is_finished());
    }

    #[tokio::test]
    async fn test_decode_stream_finished() {
        let chunks: Vec<Result<Vec<u8>, String>> = HELLO
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let mut text = String::new();
        let summary = decode_stream(stream::iter(chunks), &AbortSignal::new(), |t| {
            text.push_str(t);
        })
        .await
        .unwrap();

        assert_eq!(text, "Hello");
        assert_eq!(summary.end, StreamEnd::Finished);
        assert_eq!(summary.fragments, 2);
    }

    #[tokio::test]
    async fn test_decode_stream_end_without_sentinel() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n";
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(body.as_bytes().to_vec())];
        let summary = decode_stream(stream::iter(chunks), &AbortSignal::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(summary.end, StreamEnd::EndOfStream);
        assert_eq!(summary.fragments, 1);
    }

    #[tokio::test]
    async fn test_decode_stream_drops_unterminated_tail() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}".to_vec()),
        ];
        let mut seen = Vec::new();
        let summary = decode_stream(stream::iter(chunks), &AbortSignal::new(), |t| {
            seen.push(t.to_string());
        })
        .await
        .unwrap();

        assert_eq!(seen, vec!["a"]);
        assert_eq!(summary.end, StreamEnd::EndOfStream);
        assert_eq!(summary.fragments, 1);
    }

    #[tokio::test]
    async fn test_decode_stream_read_error_reports_delivered() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n";
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(body.as_bytes().to_vec()),
            Err("connection reset".to_string()),
        ];
        let err = decode_stream(stream::iter(chunks), &AbortSignal::new(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.delivered, 1);
        assert!(err.message.contains("reset"));
    }

    #[tokio::test]
    async fn test_decode_stream_abort_stops_delivery() {
        let cancel = AbortSignal::new();
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(body.as_bytes().to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n".to_vec()),
        ];

        let mut seen = Vec::new();
        let trigger = cancel.clone();
        let summary = decode_stream(stream::iter(chunks), &cancel, |t| {
            seen.push(t.to_string());
            trigger.signal();
        })
        .await
        .unwrap();

        assert_eq!(summary.end, StreamEnd::Aborted);
        assert_eq!(seen, vec!["a"]);
        assert_eq!(summary.fragments, 1);
    }
}
