//! A cloneable handle onto a session's in-flight stream.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::node::NodeId;

/// Live text of the stream currently being ingested.
///
/// Only the holder of the current `generation` may write; every terminal
/// transition clears the slot.
#[derive(Debug, Clone, Default)]
pub struct StreamingSlot {
    generation: u64,
    owner: Option<NodeId>,
    content: String,
}

/// A cloneable handle for aborting and observing the active stream.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone, Default)]
pub struct ChatHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    slot: Arc<Mutex<StreamingSlot>>,
}

impl ChatHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `node_id`, cancelling whatever stream held it.
    ///
    /// Returns the new generation and the token for this stream.
    pub(crate) fn begin(&self, node_id: NodeId) -> (u64, CancellationToken) {
        let token = {
            let mut cancel = self.cancel.lock();
            cancel.cancel();
            *cancel = CancellationToken::new();
            cancel.clone()
        };
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.owner = Some(node_id);
        slot.content.clear();
        (slot.generation, token)
    }

    /// Append a delta; ignored unless `generation` is current
    pub(crate) fn push(&self, generation: u64, delta: &str) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation || slot.owner.is_none() {
            return false;
        }
        slot.content.push_str(delta);
        true
    }

    /// Clear the slot; ignored unless `generation` is current
    pub(crate) fn finish(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return false;
        }
        slot.owner = None;
        slot.content.clear();
        true
    }

    /// Cancel the active stream, if any
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    pub fn is_streaming(&self) -> bool {
        self.slot.lock().owner.is_some()
    }

    /// Node currently receiving tokens
    pub fn streaming_node(&self) -> Option<NodeId> {
        self.slot.lock().owner.clone()
    }

    /// Text accumulated so far by the active stream
    pub fn streaming_content(&self) -> String {
        self.slot.lock().content.clone()
    }
}
