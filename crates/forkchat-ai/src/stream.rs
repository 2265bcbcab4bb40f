//! Streaming ingestion: folds a completion byte stream into accumulated text.
//!
//! [`StreamIngestor`] is a one-shot state machine:
//! `Idle -> Streaming -> {Completed | Cancelled | Errored}`. It never returns
//! an `Err`; every way a stream can end is described by [`StreamTerminal`].

use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    frame::{Frame, FrameDecoder},
    transport::ByteStream,
};

/// Silence window after the first token before a stream is treated as done
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(8);

/// Ingestion settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    pub idle_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Phase a stream ends in; a running stream is tracked by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    Completed,
    Cancelled,
    Errored,
}

/// Why a stream counted as completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// `[DONE]` was received
    Sentinel,
    /// The transport closed
    EndOfStream,
    /// No token arrived within the idle window
    IdleTimeout,
}

/// Terminal state of one stream
#[derive(Debug)]
pub enum StreamTerminal {
    Completed(CompletionReason),
    Cancelled,
    Errored(Error),
}

impl StreamTerminal {
    pub fn phase(&self) -> StreamPhase {
        match self {
            StreamTerminal::Completed(_) => StreamPhase::Completed,
            StreamTerminal::Cancelled => StreamPhase::Cancelled,
            StreamTerminal::Errored(_) => StreamPhase::Errored,
        }
    }
}

/// Result of driving a stream to a terminal state
#[derive(Debug)]
pub struct StreamOutcome {
    pub terminal: StreamTerminal,
    /// Concatenation of every emitted token, in arrival order
    pub content: String,
    pub tokens: usize,
    /// `data:` lines skipped because they did not deserialize
    pub malformed_frames: usize,
}

impl StreamOutcome {
    /// Outcome for a stream that failed before any byte arrived
    pub fn failed(error: Error) -> Self {
        Self {
            terminal: StreamTerminal::Errored(error),
            content: String::new(),
            tokens: 0,
            malformed_frames: 0,
        }
    }

    /// Outcome for a stream cancelled before it was opened
    pub fn cancelled() -> Self {
        Self {
            terminal: StreamTerminal::Cancelled,
            content: String::new(),
            tokens: 0,
            malformed_frames: 0,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.terminal {
            StreamTerminal::Errored(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.terminal, StreamTerminal::Cancelled)
    }

    /// Text to store on the target node: the accumulated content, with an
    /// error marker appended when the stream errored.
    pub fn finalized_content(&self) -> String {
        match self.error() {
            Some(error) => error_marker(&self.content, error),
            None => self.content.clone(),
        }
    }
}

/// Append a human-readable error marker to partial content
pub fn error_marker(partial: &str, error: &Error) -> String {
    if partial.is_empty() {
        format!("[Error: {}]", error)
    } else {
        format!("{}\n\n[Error: {}]", partial, error)
    }
}

enum Step {
    Chunk(Option<Result<Bytes>>),
    Cancelled,
    IdleTimeout,
}

/// Drives one completion stream
#[derive(Debug)]
pub struct StreamIngestor {
    config: IngestConfig,
    decoder: FrameDecoder,
    buffer: String,
    tokens: usize,
    last_activity: Instant,
}

impl StreamIngestor {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            decoder: FrameDecoder::new(),
            buffer: String::new(),
            tokens: 0,
            last_activity: Instant::now(),
        }
    }

    /// Consume `body` until a terminal state, calling `on_token` for every
    /// non-empty content delta in arrival order.
    pub async fn run<F>(
        mut self,
        mut body: ByteStream,
        cancel: CancellationToken,
        mut on_token: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str),
    {
        self.buffer.clear();
        self.tokens = 0;
        self.last_activity = Instant::now();

        let terminal = 'read: loop {
            let step = if self.tokens > 0 {
                let deadline = self.last_activity + self.config.idle_timeout;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    next = tokio::time::timeout_at(deadline, body.next()) => match next {
                        Ok(item) => Step::Chunk(item),
                        Err(_) => Step::IdleTimeout,
                    },
                }
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    item = body.next() => Step::Chunk(item),
                }
            };

            let chunk = match step {
                Step::Cancelled => break StreamTerminal::Cancelled,
                Step::IdleTimeout => {
                    break StreamTerminal::Completed(CompletionReason::IdleTimeout);
                }
                Step::Chunk(None) => {
                    break StreamTerminal::Completed(CompletionReason::EndOfStream);
                }
                Step::Chunk(Some(Err(e))) => break StreamTerminal::Errored(e),
                Step::Chunk(Some(Ok(chunk))) => chunk,
            };

            for frame in self.decoder.process(&chunk) {
                match frame {
                    Frame::Done => {
                        break 'read StreamTerminal::Completed(CompletionReason::Sentinel);
                    }
                    Frame::Token(token) => {
                        self.buffer.push_str(&token);
                        self.tokens += 1;
                        self.last_activity = Instant::now();
                        on_token(&token);
                    }
                }
            }
        };

        let dropped = self.decoder.finish();
        if dropped > 0 {
            tracing::debug!("Discarded {} bytes of unterminated frame", dropped);
        }
        tracing::debug!(
            phase = ?terminal.phase(),
            tokens = self.tokens,
            malformed = self.decoder.malformed_frames(),
            "Stream finished"
        );

        StreamOutcome {
            terminal,
            content: self.buffer,
            tokens: self.tokens,
            malformed_frames: self.decoder.malformed_frames(),
        }
    }
}
