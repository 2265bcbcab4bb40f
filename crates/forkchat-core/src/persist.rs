//! Serializable snapshot of a conversation.
//!
//! Nodes and branch selections are stored as ordered `(key, value)` lists so
//! the JSON is stable across saves. Loading repairs what older or damaged
//! data may carry: missing `branch_index` values are re-derived, dangling
//! child ids and unreachable nodes are dropped, and active selections are
//! clamped into range.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::{
    branch::ActiveBranchMap,
    conversation::Conversation,
    error::{Error, Result},
    node::{MessageNode, NodeId, Role},
    pool::NodePool,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_archived: bool,
    pub model: String,
    #[serde(default)]
    pub system_prompt_id: Option<String>,
    pub root_node_id: NodeId,
    pub nodes: Vec<(NodeId, StoredNode)>,
    #[serde(default)]
    pub active_branches: Vec<(NodeId, usize)>,
}

/// A node without its transient UI flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub id: NodeId,
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
    #[serde(default)]
    pub branch_index: Option<usize>,
    pub model: String,
}

impl From<&MessageNode> for StoredNode {
    fn from(node: &MessageNode) -> Self {
        Self {
            id: node.id.clone(),
            role: node.role,
            content: node.content.clone(),
            timestamp: node.timestamp,
            parent_id: node.parent_id.clone(),
            child_ids: node.child_ids.clone(),
            branch_index: Some(node.branch_index),
            model: node.model.clone(),
        }
    }
}

impl From<StoredNode> for MessageNode {
    fn from(stored: StoredNode) -> Self {
        Self {
            id: stored.id,
            role: stored.role,
            content: stored.content,
            timestamp: stored.timestamp,
            is_streaming: false,
            is_editing: false,
            parent_id: stored.parent_id,
            child_ids: stored.child_ids,
            branch_index: stored.branch_index.unwrap_or(0),
            model: stored.model,
        }
    }
}

impl Conversation {
    /// Snapshot for saving; nodes in depth-first order from the root
    pub fn to_stored(&self) -> StoredConversation {
        let nodes = self
            .pool
            .preorder()
            .into_iter()
            .filter_map(|id| self.pool.get(&id).map(|n| (id, StoredNode::from(n))))
            .collect();

        let mut active_branches: Vec<(NodeId, usize)> = self
            .active
            .iter()
            .map(|(parent, index)| (parent.clone(), index))
            .collect();
        active_branches.sort();

        StoredConversation {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_archived: self.is_archived,
            model: self.model.clone(),
            system_prompt_id: self.system_prompt_id.clone(),
            root_node_id: self.pool.root_id().clone(),
            nodes,
            active_branches,
        }
    }

    /// Rebuild a conversation from a snapshot, repairing recoverable damage.
    ///
    /// Fails with [`Error::Corrupt`] when the root node is missing or the
    /// repaired tree still violates the invariants.
    pub fn from_stored(stored: StoredConversation) -> Result<Self> {
        let root_id = stored.root_node_id;
        let mut nodes: HashMap<NodeId, MessageNode> = HashMap::with_capacity(stored.nodes.len());
        for (key, node) in stored.nodes {
            if key != node.id {
                tracing::warn!("Stored node key {} does not match id {}, using id", key, node.id);
            }
            nodes.insert(node.id.clone(), MessageNode::from(node));
        }
        if !nodes.contains_key(&root_id) {
            return Err(Error::Corrupt(format!("root node {root_id} missing")));
        }

        relink(&root_id, &mut nodes);

        let mut active = ActiveBranchMap::new();
        for (parent, index) in stored.active_branches {
            let total = nodes.get(&parent).map(|n| n.child_ids.len()).unwrap_or(0);
            if total == 0 {
                continue;
            }
            if index >= total {
                tracing::warn!(
                    "Clamping active branch {} of {} to {}",
                    index,
                    parent,
                    total - 1
                );
            }
            active.set(parent, index.min(total - 1));
        }

        let conversation = Conversation {
            id: stored.id,
            title: stored.title,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            is_generating_title: false,
            is_archived: stored.is_archived,
            model: stored.model,
            system_prompt_id: stored.system_prompt_id,
            pool: NodePool::from_parts(root_id, nodes),
            active,
        };
        conversation.check_invariants()?;
        Ok(conversation)
    }
}

/// Walk from the root, keeping the first claim on every child id and
/// rewriting `parent_id`/`branch_index` from the surviving `child_ids`.
fn relink(root_id: &NodeId, nodes: &mut HashMap<NodeId, MessageNode>) {
    let mut reached: HashSet<NodeId> = HashSet::from([root_id.clone()]);
    let mut stack = vec![root_id.clone()];

    while let Some(id) = stack.pop() {
        let Some(node) = nodes.get(&id) else {
            continue;
        };
        let mut kept = Vec::with_capacity(node.child_ids.len());
        for child_id in &node.child_ids {
            if !nodes.contains_key(child_id) {
                tracing::warn!("Dropping dangling child id {} under {}", child_id, id);
            } else if !reached.insert(child_id.clone()) {
                tracing::warn!("Dropping repeated child id {} under {}", child_id, id);
            } else {
                kept.push(child_id.clone());
            }
        }

        let parent_link = (id != *root_id).then(|| id.clone());
        for (index, child_id) in kept.iter().enumerate() {
            if let Some(child) = nodes.get_mut(child_id) {
                child.parent_id = parent_link.clone();
                child.branch_index = index;
            }
        }
        stack.extend(kept.iter().rev().cloned());
        if let Some(node) = nodes.get_mut(&id) {
            node.child_ids = kept;
        }
    }

    if let Some(root) = nodes.get_mut(root_id) {
        root.parent_id = None;
        root.branch_index = 0;
    }
    let before = nodes.len();
    nodes.retain(|id, _| reached.contains(id));
    if nodes.len() < before {
        tracing::warn!("Dropped {} unreachable node(s)", before - nodes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodePatch;

    fn branched() -> Conversation {
        let mut conv = Conversation::new("OpenAI: gpt-4o");
        let root = conv.root_id().clone();
        let user = conv.insert_child(&root, MessageNode::user("Hello")).unwrap();
        let first = conv
            .insert_child(&user, MessageNode::assistant_placeholder("OpenAI: gpt-4o"))
            .unwrap();
        conv.update_node(&first, NodePatch::finalize("Hi there")).unwrap();
        let second = conv
            .insert_child(&user, MessageNode::assistant_placeholder("OpenAI: gpt-4o"))
            .unwrap();
        conv.update_node(&second, NodePatch::finalize("Hello!")).unwrap();
        conv.title = "Greetings".into();
        conv
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let conv = branched();
        let json = serde_json::to_string_pretty(&conv.to_stored()).unwrap();
        let stored: StoredConversation = serde_json::from_str(&json).unwrap();
        let restored = Conversation::from_stored(stored).unwrap();

        assert_eq!(restored, conv);
        assert_eq!(restored.to_stored(), conv.to_stored());
    }

    #[test]
    fn test_transient_flags_are_not_restored() {
        let mut conv = branched();
        let tail = conv.tail_id();
        conv.update_node(&tail, NodePatch::editing(true)).unwrap();
        conv.is_generating_title = true;

        let restored = Conversation::from_stored(conv.to_stored()).unwrap();
        assert!(!restored.get(&tail).unwrap().is_editing);
        assert!(!restored.is_generating_title);
    }

    #[test]
    fn test_missing_branch_index_is_rederived() {
        let conv = branched();
        let mut stored = conv.to_stored();
        for (_, node) in stored.nodes.iter_mut() {
            node.branch_index = None;
        }
        let restored = Conversation::from_stored(stored).unwrap();
        let tail = restored.get(&restored.tail_id()).unwrap();
        assert_eq!(tail.branch_index, 1);
    }

    #[test]
    fn test_dangling_children_dropped_and_active_clamped() {
        let conv = branched();
        let user = conv.visible_path()[0].id.clone();
        let mut stored = conv.to_stored();
        for (id, node) in stored.nodes.iter_mut() {
            if *id == user {
                node.child_ids.push(NodeId::from("ghost"));
            }
        }
        for (parent, index) in stored.active_branches.iter_mut() {
            if *parent == user {
                *index = 9;
            }
        }

        let restored = Conversation::from_stored(stored).unwrap();
        assert_eq!(restored.pool().children_of(&user).len(), 2);
        assert_eq!(restored.active_branches().get(&user), 1);
        restored.check_invariants().unwrap();
    }

    #[test]
    fn test_unreachable_nodes_are_dropped() {
        let conv = branched();
        let mut stored = conv.to_stored();
        let stray = MessageNode::user("stray");
        stored.nodes.push((stray.id.clone(), StoredNode::from(&stray)));

        let restored = Conversation::from_stored(stored).unwrap();
        assert!(restored.get(&stray.id).is_none());
        assert_eq!(restored.pool().len(), 3);
    }

    #[test]
    fn test_missing_root_is_corrupt() {
        let mut stored = branched().to_stored();
        stored.root_node_id = NodeId::from("nowhere");
        assert!(matches!(
            Conversation::from_stored(stored),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_older_data_without_optional_fields() {
        let conv = branched();
        let mut value = serde_json::to_value(conv.to_stored()).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("is_archived");
        object.remove("system_prompt_id");
        object.remove("active_branches");

        let stored: StoredConversation = serde_json::from_value(value).unwrap();
        let restored = Conversation::from_stored(stored).unwrap();
        assert_eq!(restored.visible_path()[1].content, "Hi there");
    }
}
