//! Conversation: one node pool, its branch selection, and metadata.

use std::collections::HashSet;

use forkchat_ai::ChatMessage;

use crate::{
    branch::{ActiveBranchMap, BranchInfo},
    error::{Error, Result},
    node::{MessageNode, NodeId, NodePatch},
    pool::NodePool,
    title::DEFAULT_TITLE,
};

/// A branching conversation.
///
/// The tree lives in [`NodePool`]; which branch is shown lives in
/// [`ActiveBranchMap`]. The visible path is always recomputed from the two.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
    pub is_generating_title: bool,
    pub is_archived: bool,
    /// Provider-prefixed model used for new generations
    pub model: String,
    pub system_prompt_id: Option<String>,
    pub(crate) pool: NodePool,
    pub(crate) active: ActiveBranchMap,
}

impl Conversation {
    /// Empty conversation: just the root anchor
    pub fn new(model: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            is_generating_title: false,
            is_archived: false,
            model: model.into(),
            system_prompt_id: None,
            pool: NodePool::new(),
            active: ActiveBranchMap::new(),
        }
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn active_branches(&self) -> &ActiveBranchMap {
        &self.active
    }

    pub fn root_id(&self) -> &NodeId {
        self.pool.root_id()
    }

    pub fn get(&self, id: &NodeId) -> Option<&MessageNode> {
        self.pool.get(id)
    }

    pub fn visible_path(&self) -> Vec<&MessageNode> {
        self.active.visible_path(&self.pool)
    }

    pub fn branch_info(&self, id: &NodeId) -> Option<BranchInfo> {
        self.active.branch_info(&self.pool, id)
    }

    /// Last node of the visible path, or the root when empty
    pub fn tail_id(&self) -> NodeId {
        self.visible_path()
            .last()
            .map(|n| n.id.clone())
            .unwrap_or_else(|| self.root_id().clone())
    }

    /// Length of the visible path
    pub fn message_count(&self) -> usize {
        self.visible_path().len()
    }

    pub fn is_on_visible_path(&self, id: &NodeId) -> bool {
        self.visible_path().iter().any(|n| n.id == *id)
    }

    pub fn insert_child(&mut self, parent_id: &NodeId, node: MessageNode) -> Result<NodeId> {
        let id = self.pool.insert_child(&mut self.active, parent_id, node)?;
        self.touch();
        Ok(id)
    }

    pub fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<()> {
        self.pool.update_node(id, patch)
    }

    pub(crate) fn append_content(&mut self, id: &NodeId, delta: &str) -> bool {
        self.pool.append_content(id, delta)
    }

    /// Select child `index` of `parent_id`; `false` when out of range
    pub fn switch_branch(&mut self, parent_id: &NodeId, index: usize) -> bool {
        self.active.switch_branch(&self.pool, parent_id, index)
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Nodes from the first message down to `id`, following parent links.
    ///
    /// Works for any node, visible or not. Errors with `NodeNotFound` when
    /// `id` or one of its ancestors is missing.
    pub fn lineage(&self, id: &NodeId) -> Result<Vec<&MessageNode>> {
        let mut chain = Vec::new();
        let mut current = id;
        while current != self.root_id() {
            if chain.len() > self.pool.len() {
                return Err(corrupt(format!("parent links of {id} form a cycle")));
            }
            let node = self
                .pool
                .get(current)
                .ok_or_else(|| Error::NodeNotFound(current.clone()))?;
            chain.push(node);
            current = node.parent_id.as_ref().unwrap_or(self.root_id());
        }
        chain.reverse();
        Ok(chain)
    }

    /// Select every ancestor branch leading to `id`, so it lies on the
    /// visible path.
    pub fn reveal(&mut self, id: &NodeId) -> Result<()> {
        let steps: Vec<(NodeId, usize)> = self
            .lineage(id)?
            .iter()
            .map(|n| {
                let parent = n.parent_id.clone().unwrap_or_else(|| self.root_id().clone());
                (parent, n.branch_index)
            })
            .collect();
        for (parent, index) in steps {
            self.active.switch_branch(&self.pool, &parent, index);
        }
        Ok(())
    }

    /// Request history along `id`'s ancestor chain, ending with `id`
    pub fn history_through(&self, id: &NodeId) -> Result<Vec<ChatMessage>> {
        Ok(to_messages(&self.lineage(id)?))
    }

    /// Request history along `id`'s ancestor chain, strictly before `id`
    pub fn history_before(&self, id: &NodeId) -> Result<Vec<ChatMessage>> {
        let chain = self.lineage(id)?;
        Ok(to_messages(&chain[..chain.len().saturating_sub(1)]))
    }

    /// Verify the tree invariants, reporting the first violation.
    ///
    /// Checks that every node is reachable exactly once from the root, that
    /// parent links and `branch_index` agree with `child_ids`, and that every
    /// active selection is in range.
    pub fn check_invariants(&self) -> Result<()> {
        let pool = &self.pool;
        let root = pool.root_id();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                return Err(corrupt(format!("node {id} is reachable more than once")));
            }
            let node = pool
                .get(&id)
                .ok_or_else(|| corrupt(format!("dangling child id {id}")))?;
            let expected_parent = (id != *root).then_some(&id);

            for (index, child_id) in node.child_ids.iter().enumerate() {
                let child = pool
                    .get(child_id)
                    .ok_or_else(|| corrupt(format!("dangling child id {child_id} under {id}")))?;
                if child.parent_id.as_ref() != expected_parent {
                    return Err(corrupt(format!("node {child_id} has a mismatched parent")));
                }
                if child.branch_index != index {
                    return Err(corrupt(format!(
                        "node {child_id} has branch_index {} but sits at {index}",
                        child.branch_index
                    )));
                }
                stack.push(child_id.clone());
            }
        }

        if seen.len() != pool.len() + 1 {
            return Err(corrupt(format!(
                "{} node(s) unreachable from the root",
                pool.len() + 1 - seen.len()
            )));
        }

        for (parent, index) in self.active.iter() {
            let total = pool.children_of(parent).len();
            if total > 0 && index >= total {
                return Err(corrupt(format!(
                    "active index {index} out of range for {parent} ({total} children)"
                )));
            }
        }
        Ok(())
    }
}

fn to_messages(path: &[&MessageNode]) -> Vec<ChatMessage> {
    path.iter().filter_map(|n| n.to_chat_message()).collect()
}

fn corrupt(message: String) -> Error {
    Error::Corrupt(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Role;

    fn two_turns() -> (Conversation, NodeId, NodeId) {
        let mut conv = Conversation::new("OpenAI: gpt-4o");
        let root = conv.root_id().clone();
        let user = conv.insert_child(&root, MessageNode::user("Hello")).unwrap();
        let mut reply = MessageNode::assistant_placeholder("OpenAI: gpt-4o");
        reply.content = "Hi there".into();
        reply.is_streaming = false;
        let assistant = conv.insert_child(&user, reply).unwrap();
        (conv, user, assistant)
    }

    #[test]
    fn test_new_conversation_is_empty() {
        let conv = Conversation::new("OpenAI: gpt-4o");
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert!(conv.visible_path().is_empty());
        assert_eq!(conv.tail_id(), *conv.root_id());
        conv.check_invariants().unwrap();
    }

    #[test]
    fn test_tail_and_count() {
        let (conv, _, assistant) = two_turns();
        assert_eq!(conv.tail_id(), assistant);
        assert_eq!(conv.message_count(), 2);
        conv.check_invariants().unwrap();
    }

    #[test]
    fn test_history_slices() {
        let (conv, user, assistant) = two_turns();

        let through = conv.history_through(&user).unwrap();
        assert_eq!(through.len(), 1);
        assert_eq!(through[0].content, "Hello");

        let before = conv.history_before(&assistant).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].role, forkchat_ai::Role::User);

        assert!(matches!(
            conv.history_before(&NodeId::from("elsewhere")),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_history_follows_hidden_branch() {
        let (mut conv, user, assistant) = two_turns();
        let root = conv.root_id().clone();
        conv.insert_child(&root, MessageNode::user("other")).unwrap();
        assert!(!conv.is_on_visible_path(&assistant));

        let history = conv.history_through(&assistant).unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["Hello", "Hi there"]);
        assert_eq!(conv.lineage(&assistant).unwrap()[0].id, user);
    }

    #[test]
    fn test_reveal_selects_ancestors() {
        let (mut conv, user, assistant) = two_turns();
        let root = conv.root_id().clone();
        conv.insert_child(&root, MessageNode::user("other")).unwrap();
        assert!(!conv.is_on_visible_path(&user));

        conv.reveal(&assistant).unwrap();
        let ids: Vec<_> = conv.visible_path().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, [user, assistant]);
        conv.check_invariants().unwrap();
    }

    #[test]
    fn test_detects_branch_index_mismatch() {
        let (mut conv, _, assistant) = two_turns();
        let mut nodes: std::collections::HashMap<NodeId, MessageNode> =
            conv.pool.iter().map(|n| (n.id.clone(), n.clone())).collect();
        nodes.get_mut(&assistant).unwrap().branch_index = 3;
        conv.pool = NodePool::from_parts(conv.root_id().clone(), nodes);
        assert!(matches!(conv.check_invariants(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_detects_orphan_and_dangling() {
        let (conv, user, _) = two_turns();
        let root = conv.root_id().clone();

        let mut nodes: std::collections::HashMap<NodeId, MessageNode> =
            conv.pool.iter().map(|n| (n.id.clone(), n.clone())).collect();
        let orphan = MessageNode::new(Role::User, "lost", "user");
        nodes.insert(orphan.id.clone(), orphan);
        let mut broken = conv.clone();
        broken.pool = NodePool::from_parts(root.clone(), nodes.clone());
        assert!(broken.check_invariants().is_err());

        nodes
            .get_mut(&user)
            .unwrap()
            .child_ids
            .push(NodeId::from("ghost"));
        broken.pool = NodePool::from_parts(root, nodes);
        assert!(broken.check_invariants().is_err());
    }

    #[test]
    fn test_detects_active_out_of_range() {
        let (mut conv, user, _) = two_turns();
        conv.active.set(user, 5);
        assert!(matches!(conv.check_invariants(), Err(Error::Corrupt(_))));
    }
}
