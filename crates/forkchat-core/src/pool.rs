//! Node pool: a flat id-indexed arena holding every node of one conversation.
//!
//! The tree is implicit in `parent_id`/`child_ids`; all traversal goes
//! through id lookups. A synthetic root node anchors the first turn(s).

use std::collections::HashMap;

use crate::{
    branch::ActiveBranchMap,
    error::{Error, Result},
    node::{MessageNode, NodeId, NodePatch},
};

#[derive(Debug, Clone, PartialEq)]
pub struct NodePool {
    root_id: NodeId,
    nodes: HashMap<NodeId, MessageNode>,
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new()
    }
}

impl NodePool {
    /// Create a pool holding only the root anchor
    pub fn new() -> Self {
        let root = MessageNode::root();
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self { root_id, nodes }
    }

    /// Assemble a pool from already-validated parts
    pub(crate) fn from_parts(root_id: NodeId, nodes: HashMap<NodeId, MessageNode>) -> Self {
        Self { root_id, nodes }
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    pub fn get(&self, id: &NodeId) -> Option<&MessageNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of message nodes, excluding the root
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all nodes, root included, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &MessageNode> {
        self.nodes.values()
    }

    /// Children of `id`; empty when the node is unknown
    pub fn children_of(&self, id: &NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.child_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Parent of `id`, resolving top-level nodes to the root.
    ///
    /// `None` for the root itself and for unknown ids.
    pub fn parent_of(&self, id: &NodeId) -> Option<&NodeId> {
        if *id == self.root_id {
            return None;
        }
        let node = self.nodes.get(id)?;
        Some(node.parent_id.as_ref().unwrap_or(&self.root_id))
    }

    /// Append `node` to `parent_id`'s children and make it the active branch.
    ///
    /// The node's structural fields are overwritten: it is inserted childless,
    /// with `branch_index` set to its append position.
    pub fn insert_child(
        &mut self,
        active: &mut ActiveBranchMap,
        parent_id: &NodeId,
        mut node: MessageNode,
    ) -> Result<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(Error::DuplicateNode(node.id));
        }
        let parent = self
            .nodes
            .get_mut(parent_id)
            .ok_or_else(|| Error::NodeNotFound(parent_id.clone()))?;

        let index = parent.child_ids.len();
        parent.child_ids.push(node.id.clone());

        node.parent_id = if *parent_id == self.root_id {
            None
        } else {
            Some(parent_id.clone())
        };
        node.child_ids.clear();
        node.branch_index = index;

        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        active.set(parent_id.clone(), index);
        Ok(id)
    }

    /// Apply a partial update to one node
    pub fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;
        patch.apply(node);
        Ok(())
    }

    /// Append a streamed delta to a node's content
    pub(crate) fn append_content(&mut self, id: &NodeId, delta: &str) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Ids in depth-first pre-order from the root (root first)
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root_id.clone()];
        while let Some(id) = stack.pop() {
            if order.len() > self.nodes.len() {
                break;
            }
            stack.extend(self.children_of(&id).iter().rev().cloned());
            order.push(id);
        }
        order
    }
}
