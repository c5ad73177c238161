//! Frame Decoder
//!
//! Turns the chunked body of a completion response into [`DecodedEvent`]s.
//!
//! # Frame Grammar
//!
//! ```text
//! : keep-alive                                      comment, ignored
//!                                                   blank, ignored
//! event: ping                                       no `data: ` prefix, ignored
//! data: {"choices":[{"delta":{"content":"Hi"}}]}   ContentDelta("Hi")
//! data: {"choices":[{"delta":{}}]}                  nothing (control frame)
//! data: {not valid}                                 Unparseable(line)
//! data: [DONE]                                      StreamEnd, decoding stops
//! ```
//!
//! Lines end at `\n`; a trailing `\r` is stripped first. Bytes are decoded
//! incrementally, so a code point split across two network chunks is
//! reassembled rather than replaced. Malformed content never fails the
//! decoder; only the byte source can fail, and its error is passed through.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, Stream, StreamExt};
use serde::Deserialize;

/// Prefix every payload-carrying line starts with
const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream
const DONE_SENTINEL: &str = "[DONE]";

/// Initial capacity of the pending-line buffer
const MIN_BUFFER_CAPACITY: usize = 1024;

/// Event produced by the decoder
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A fragment of assistant output to append
    ContentDelta(String),
    /// The server sent the `[DONE]` sentinel
    StreamEnd,
    /// A `data:` line whose payload is not valid JSON
    Unparseable(String),
}

/// Result of classifying a single complete line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Payload carried non-empty delta content
    Delta(String),
    /// Payload was the `[DONE]` sentinel
    End,
    /// Payload failed JSON parsing
    Unparseable,
    /// Comment, blank, foreign field, or a frame without content
    Skip,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

/// Classify one line (without its `\n`)
///
/// Never fails: every input maps to a [`LineOutcome`].
#[must_use]
pub fn parse_line(line: &str) -> LineOutcome {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() || line.starts_with(':') {
        return LineOutcome::Skip;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };

    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::End;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return LineOutcome::Unparseable,
    };

    match extract_content(value) {
        Some(content) if !content.is_empty() => LineOutcome::Delta(content),
        _ => LineOutcome::Skip,
    }
}

/// Pull `choices[0].delta.content` out of a parsed payload
///
/// Payloads of any other shape (arrays, `null`, numbers, objects without the
/// path) carry no content. Only string content is accepted.
fn extract_content(value: serde_json::Value) -> Option<String> {
    let payload: ChunkPayload = serde_json::from_value(value).ok()?;
    let content = payload.choices.into_iter().next()?.delta?.content?;
    match content {
        serde_json::Value::String(text) => Some(text),
        _ => None,
    }
}

/// Incremental UTF-8 decoder
///
/// Carries an incomplete trailing code point over to the next call. Invalid
/// sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8], out: &mut String) {
        let joined;
        let mut rest: &[u8] = if self.partial.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.partial);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.partial.extend_from_slice(tail);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    fn reset(&mut self) {
        self.partial.clear();
    }
}

/// Line-buffering decoder state machine
///
/// Push raw chunks in arrival order; each call returns the events completed by
/// that chunk. Once the `[DONE]` sentinel has been seen the decoder is
/// finished and ignores all further input.
#[derive(Debug)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    /// Text not yet terminated by a newline
    pending: String,
    /// Set once `[DONE]` was decoded
    finished: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            utf8: Utf8Decoder::default(),
            pending: String::with_capacity(MIN_BUFFER_CAPACITY),
            finished: false,
        }
    }

    /// Whether the stream-end sentinel has been decoded
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes and characters held back waiting for more input
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len() + self.utf8.pending_bytes()
    }

    /// Feed one chunk and collect the events it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.utf8.decode(chunk, &mut self.pending);

        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].find('\n') {
            let end = consumed + offset;
            let line = &self.pending[consumed..end];
            consumed = end + 1;

            match parse_line(line) {
                LineOutcome::Delta(content) => events.push(DecodedEvent::ContentDelta(content)),
                LineOutcome::End => {
                    self.finished = true;
                    events.push(DecodedEvent::StreamEnd);
                    break;
                }
                LineOutcome::Unparseable => {
                    let raw = line.strip_suffix('\r').unwrap_or(line);
                    events.push(DecodedEvent::Unparseable(raw.to_string()));
                }
                LineOutcome::Skip => {}
            }
        }

        if self.finished {
            self.pending.clear();
            self.utf8.reset();
        } else {
            self.pending.drain(..consumed);
        }

        events
    }

    /// Signal end of input
    ///
    /// An unterminated trailing line is a truncated frame and is dropped.
    pub fn finish(&mut self) {
        if self.buffered() > 0 {
            tracing::debug!(
                bytes = self.buffered(),
                "Discarding unterminated frame at end of stream"
            );
        }
        self.pending.clear();
        self.utf8.reset();
    }
}

/// Lazy event stream over a chunked byte source
///
/// Polls the source only when no decoded events are queued, and never polls it
/// again after `[DONE]`, after the source ends, or after the source fails.
pub struct FrameStream<S> {
    source: S,
    decoder: FrameDecoder,
    queue: VecDeque<DecodedEvent>,
    exhausted: bool,
}

impl<S> FrameStream<S> {
    /// Wrap a byte-chunk stream
    pub fn new(source: S) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(),
            queue: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S, B, E> Stream for FrameStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<DecodedEvent, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.queue.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            if this.exhausted || this.decoder.is_finished() {
                return Poll::Ready(None);
            }

            match ready!(this.source.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    let events = this.decoder.push(chunk.as_ref());
                    this.queue.extend(events);
                }
                Some(Err(err)) => {
                    this.exhausted = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.decoder.finish();
                    this.exhausted = true;
                }
            }
        }
    }
}
