//! forkchat-ai: provider routing and streaming ingestion for chat-completion APIs
//!
//! This crate resolves provider-prefixed model ids, talks to OpenAI-compatible
//! `/chat/completions` endpoints, and folds token-streamed responses into
//! accumulated text.

pub mod error;
pub mod frame;
pub mod provider;
pub mod stream;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use provider::{ProviderConfig, ProviderRegistry, ResolvedModel};
pub use stream::{
    CompletionReason, IngestConfig, StreamIngestor, StreamOutcome, StreamPhase, StreamTerminal,
};
pub use transport::{ByteStream, HttpTransport, Transport};
pub use types::*;
