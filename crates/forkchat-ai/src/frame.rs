//! Line-buffered decoder for `data:`-framed completion streams.
//!
//! Bytes are buffered in a [`LinesCodec`] until a newline arrives, so a frame
//! split across any number of network chunks decodes exactly as if it had
//! arrived whole.

use bytes::BytesMut;
use serde::Deserialize;
use tokio_util::codec::{Decoder, LinesCodec};

/// Prefix carried by every payload line
pub const DATA_PREFIX: &str = "data:";

/// Longest line kept; longer ones are dropped up to their newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Payload marking a deliberate end of stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded, meaningful frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-empty content delta
    Token(String),
    /// Completion sentinel
    Done,
}

/// Incremental frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    codec: LinesCodec,
    buffer: BytesMut,
    malformed: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            buffer: BytesMut::new(),
            malformed: 0,
        }
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes and return every frame completed by it.
    ///
    /// The trailing fragment after the last newline stays buffered. Lines
    /// that are not valid UTF-8 or exceed [`MAX_LINE_BYTES`] count as
    /// malformed.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let line = match self.codec.decode(&mut self.buffer) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    self.malformed += 1;
                    tracing::trace!("Skipping undecodable line: {}", e);
                    continue;
                }
            };

            if let Some(frame) = self.decode_line(&line) {
                let done = frame == Frame::Done;
                frames.push(frame);
                if done {
                    break;
                }
            }
        }
        frames
    }

    /// Discard any unterminated fragment, returning how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.codec = LinesCodec::new_with_max_length(MAX_LINE_BYTES);
        dropped
    }

    /// Number of `data:` lines that failed to deserialize
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, line: &str) -> Option<Frame> {
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();

        if payload == DONE_SENTINEL {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|text| !text.is_empty())
                .map(Frame::Token),
            Err(e) => {
                self.malformed += 1;
                tracing::trace!("Skipping malformed frame: {}", e);
                None
            }
        }
    }
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
