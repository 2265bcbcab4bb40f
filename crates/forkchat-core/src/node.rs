//! Message nodes: one turn in a branching conversation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model sentinel stored on user nodes
pub const USER_MODEL: &str = "user";
/// Model sentinel stored on system nodes
pub const SYSTEM_MODEL: &str = "system";

/// Opaque node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Node roles; `Root` only ever appears on the pool's anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Root,
}

impl Role {
    /// Wire role for requests; `None` for the root anchor
    pub fn to_wire(self) -> Option<forkchat_ai::Role> {
        match self {
            Role::User => Some(forkchat_ai::Role::User),
            Role::Assistant => Some(forkchat_ai::Role::Assistant),
            Role::System => Some(forkchat_ai::Role::System),
            Role::Root => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Root => "root",
        }
    }
}

/// One turn in the conversation tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    pub id: NodeId,
    pub role: Role,
    pub content: String,
    /// Last content write, Unix millis
    pub timestamp: i64,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub is_editing: bool,
    /// `None` for top-level nodes and the root
    pub parent_id: Option<NodeId>,
    pub child_ids: Vec<NodeId>,
    /// Position within the parent's `child_ids`
    pub branch_index: usize,
    pub model: String,
}

impl MessageNode {
    /// Create a detached node; structural fields are assigned on insertion
    pub fn new(role: Role, content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_streaming: false,
            is_editing: false,
            parent_id: None,
            child_ids: Vec::new(),
            branch_index: 0,
            model: model.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, USER_MODEL)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, SYSTEM_MODEL)
    }

    /// Empty assistant placeholder, marked as streaming
    pub fn assistant_placeholder(model: impl Into<String>) -> Self {
        Self {
            is_streaming: true,
            ..Self::new(Role::Assistant, String::new(), model)
        }
    }

    pub(crate) fn root() -> Self {
        Self::new(Role::Root, String::new(), String::new())
    }

    /// Sentinel model value for a non-assistant role
    pub fn model_sentinel(role: Role) -> &'static str {
        match role {
            Role::System => SYSTEM_MODEL,
            _ => USER_MODEL,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }

    /// Request message for this node; `None` for the root
    pub fn to_chat_message(&self) -> Option<forkchat_ai::ChatMessage> {
        self.role
            .to_wire()
            .map(|role| forkchat_ai::ChatMessage::new(role, self.content.clone()))
    }
}

/// Partial update of a node's mutable fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub content: Option<String>,
    pub timestamp: Option<i64>,
    pub is_streaming: Option<bool>,
    pub is_editing: Option<bool>,
    pub model: Option<String>,
}

impl NodePatch {
    /// Final write for a finished stream: content, fresh timestamp, not streaming
    pub fn finalize(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            is_streaming: Some(false),
            ..Default::default()
        }
    }

    pub fn editing(is_editing: bool) -> Self {
        Self {
            is_editing: Some(is_editing),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, node: &mut MessageNode) {
        if let Some(content) = self.content {
            node.content = content;
        }
        if let Some(timestamp) = self.timestamp {
            node.timestamp = timestamp;
        }
        if let Some(is_streaming) = self.is_streaming {
            node.is_streaming = is_streaming;
        }
        if let Some(is_editing) = self.is_editing {
            node.is_editing = is_editing;
        }
        if let Some(model) = self.model {
            node.model = model;
        }
    }
}
