//! Error types for forkchat-core

use thiserror::Error;

use crate::node::NodeId;

/// Result type alias using forkchat-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating or loading a conversation
#[derive(Error, Debug)]
pub enum Error {
    /// A referenced node is not in the pool
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node with this id is already in the pool
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// Stored data violates the tree invariants
    #[error("Corrupt conversation: {0}")]
    Corrupt(String),

    /// An error from the provider layer
    #[error(transparent)]
    Ai(#[from] forkchat_ai::Error),
}

impl Error {
    /// Whether this is the provider-routing failure surfaced before any request
    pub fn is_unknown_provider(&self) -> bool {
        matches!(self, Error::Ai(forkchat_ai::Error::UnknownProvider(_)))
    }
}
