//! Chat session event types

use forkchat_ai::StreamPhase;
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Events broadcast by a [`crate::ChatSession`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A generation started streaming into `node_id`
    StreamStart { node_id: NodeId, model: String },

    /// A content delta arrived for `node_id`
    Token { node_id: NodeId, delta: String },

    /// The stream reached a terminal phase and the node was finalized
    StreamEnd {
        node_id: NodeId,
        phase: StreamPhase,
        content: String,
    },

    /// The stream failed; the node holds the error marker
    StreamError {
        node_id: NodeId,
        message: String,
        /// Whether regenerating may succeed
        retryable: bool,
    },

    /// Title generation started
    TitleStart,

    /// Title generation succeeded
    TitleUpdated { title: String },

    /// A branch switch landed; `leaf_id` is worth highlighting
    BranchFlash { leaf_id: NodeId },
}

impl ChatEvent {
    /// Check if this event ends a generation
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::StreamEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = ChatEvent::Token {
            node_id: NodeId::from("n1"),
            delta: "Hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "token");
        assert_eq!(json["node_id"], "n1");

        let end = ChatEvent::StreamEnd {
            node_id: NodeId::from("n1"),
            phase: StreamPhase::Cancelled,
            content: String::new(),
        };
        assert_eq!(serde_json::to_value(&end).unwrap()["phase"], "cancelled");
        assert!(end.is_terminal());
        assert!(!event.is_terminal());
    }
}
