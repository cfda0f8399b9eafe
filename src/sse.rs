//! Server-sent event framing for streamed chat turns.
//!
//! The backend writes one `data: <json>` line per frame and separates frames
//! with blank lines.  Only lines that begin with `data: ` matter; everything
//! else is ignored.  A line only counts once its terminating `\n` has arrived,
//! so a frame split across network reads is reassembled before it is parsed.

use std::collections::VecDeque;
use std::error;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_FRAMES, STREAM_MALFORMED_FRAMES};
use crate::types::StreamFrame;
use crate::{Error, Result};

/// Prefix that marks a significant line.
pub const DATA_PREFIX: &str = "data: ";

/// Incremental line-buffered frame parser.
///
/// Bytes are buffered rather than text so that a multi-byte UTF-8 sequence
/// split across two reads is decoded only once the whole line is present.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame completed by it, in line order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(frame) = parse_line(&self.buffer[start..end]) {
                frames.push(frame);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        frames
    }

    /// Bytes of the trailing incomplete line, if any.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

/// Parse one complete line (without its `\n`).
///
/// Returns `None` for insignificant lines and for `data:` lines whose payload
/// is not a recognizable frame.
pub fn parse_line(line: &[u8]) -> Option<StreamFrame> {
    let Ok(line) = std::str::from_utf8(line) else {
        STREAM_MALFORMED_FRAMES.click();
        tracing::warn!("skipping line with invalid UTF-8");
        return None;
    };
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => {
            STREAM_FRAMES.click();
            Some(frame)
        }
        Err(err) => {
            STREAM_MALFORMED_FRAMES.click();
            tracing::warn!(error = %err, payload, "skipping malformed frame");
            None
        }
    }
}

/// Process a stream of bytes into a stream of frames.
///
/// Malformed frames never surface; the only errors this stream yields are
/// transport errors from the underlying byte stream.  A trailing fragment
/// with no newline at end of stream is dropped.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<StreamFrame>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
        })
    });

    let state = (stream, FrameParser::new(), VecDeque::new());

    stream::unfold(state, |(mut stream, mut parser, mut ready)| async move {
        loop {
            if let Some(frame) = ready.pop_front() {
                return Some((Ok(frame), (stream, parser, ready)));
            }

            match stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    ready.extend(parser.feed(&bytes));
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    return Some((Err(e), (stream, parser, ready)));
                }
                None => {
                    if !parser.pending().is_empty() {
                        tracing::debug!(
                            bytes = parser.pending().len(),
                            "dropping incomplete line at end of stream"
                        );
                    }
                    return None;
                }
            }
        }
    })
}
