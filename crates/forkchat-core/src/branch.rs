//! Branch selection and the visible path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    node::{MessageNode, NodeId},
    pool::NodePool,
};

/// Per-parent index of the selected child; absent entries mean 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveBranchMap {
    selected: HashMap<NodeId, usize>,
}

/// Sibling navigation info for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub total: usize,
    pub current_index: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl ActiveBranchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected child index for `parent_id`
    pub fn get(&self, parent_id: &NodeId) -> usize {
        self.selected.get(parent_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, usize)> {
        self.selected.iter().map(|(k, v)| (k, *v))
    }

    pub(crate) fn set(&mut self, parent_id: NodeId, index: usize) {
        self.selected.insert(parent_id, index);
    }

    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (NodeId, usize)>) -> Self {
        Self {
            selected: entries.into_iter().collect(),
        }
    }

    /// Select child `index` of `parent_id`.
    ///
    /// Out-of-range indices and unknown parents are ignored; returns whether
    /// the selection was applied.
    pub fn switch_branch(&mut self, pool: &NodePool, parent_id: &NodeId, index: usize) -> bool {
        if !pool.contains(parent_id) || index >= pool.children_of(parent_id).len() {
            return false;
        }
        self.set(parent_id.clone(), index);
        true
    }

    /// Follow the selected child from the root to a leaf, root excluded.
    pub fn visible_path<'a>(&self, pool: &'a NodePool) -> Vec<&'a MessageNode> {
        let mut path = Vec::new();
        let mut current = pool.root_id();
        loop {
            let children = pool.children_of(current);
            let Some(next) = children.get(self.get(current)).or_else(|| children.first()) else {
                break;
            };
            let Some(node) = pool.get(next) else {
                break;
            };
            if path.len() > pool.len() {
                break;
            }
            path.push(node);
            current = next;
        }
        path
    }

    /// Sibling info for `node_id`; `None` for the root, unknown ids, and
    /// nodes without siblings.
    pub fn branch_info(&self, pool: &NodePool, node_id: &NodeId) -> Option<BranchInfo> {
        let parent = pool.parent_of(node_id)?;
        let total = pool.children_of(parent).len();
        if total <= 1 {
            return None;
        }
        let current_index = pool.get(node_id)?.branch_index;
        Some(BranchInfo {
            total,
            current_index,
            has_previous: current_index > 0,
            has_next: current_index + 1 < total,
        })
    }
}

/// Leaf reached from `start` by always taking the first child
pub fn default_leaf(pool: &NodePool, start: &NodeId) -> NodeId {
    let mut current = start;
    let mut steps = 0;
    while let Some(first) = pool.children_of(current).first() {
        if steps > pool.len() {
            break;
        }
        current = first;
        steps += 1;
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root -> u1 -> {a1, a2}; u1's active branch is a2 after insertion
    fn fork() -> (NodePool, ActiveBranchMap, NodeId, NodeId, NodeId) {
        let mut pool = NodePool::new();
        let mut active = ActiveBranchMap::new();
        let root = pool.root_id().clone();
        let u1 = pool
            .insert_child(&mut active, &root, MessageNode::user("Hello"))
            .unwrap();
        let mut first = MessageNode::assistant_placeholder("m");
        first.content = "first".into();
        let a1 = pool.insert_child(&mut active, &u1, first).unwrap();
        let mut second = MessageNode::assistant_placeholder("m");
        second.content = "second".into();
        let a2 = pool.insert_child(&mut active, &u1, second).unwrap();
        (pool, active, u1, a1, a2)
    }

    fn contents(path: &[&MessageNode]) -> Vec<String> {
        path.iter().map(|n| n.content.clone()).collect()
    }

    #[test]
    fn test_empty_path() {
        let pool = NodePool::new();
        assert!(ActiveBranchMap::new().visible_path(&pool).is_empty());
    }

    #[test]
    fn test_visible_path_follows_active_branch() {
        let (pool, mut active, u1, _, _) = fork();
        assert_eq!(contents(&active.visible_path(&pool)), vec!["Hello", "second"]);

        assert!(active.switch_branch(&pool, &u1, 0));
        assert_eq!(contents(&active.visible_path(&pool)), vec!["Hello", "first"]);
    }

    #[test]
    fn test_visible_path_is_deterministic() {
        let (pool, active, ..) = fork();
        let a: Vec<NodeId> = active.visible_path(&pool).iter().map(|n| n.id.clone()).collect();
        let b: Vec<NodeId> = active.visible_path(&pool).iter().map(|n| n.id.clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_absent_entry_defaults_to_first_child() {
        let (pool, _, _, a1, _) = fork();
        let path = ActiveBranchMap::new().visible_path(&pool);
        assert_eq!(path.last().unwrap().id, a1);
    }

    #[test]
    fn test_switch_out_of_range_is_noop() {
        let (pool, mut active, u1, _, _) = fork();
        let before = active.clone();
        assert!(!active.switch_branch(&pool, &u1, 2));
        assert!(!active.switch_branch(&pool, &NodeId::from("missing"), 0));
        assert_eq!(active, before);
    }

    #[test]
    fn test_branch_info() {
        let (pool, active, u1, a1, a2) = fork();

        let info = active.branch_info(&pool, &a2).unwrap();
        assert_eq!(info.total, 2);
        assert_eq!(info.current_index, 1);
        assert!(info.has_previous);
        assert!(!info.has_next);

        let info = active.branch_info(&pool, &a1).unwrap();
        assert!(!info.has_previous);
        assert!(info.has_next);

        assert!(active.branch_info(&pool, &u1).is_none());
        assert!(active.branch_info(&pool, pool.root_id()).is_none());
        assert!(active.branch_info(&pool, &NodeId::from("missing")).is_none());
    }

    #[test]
    fn test_default_leaf_takes_first_children() {
        let (mut pool, mut active, u1, a1, _) = fork();
        let follow = pool
            .insert_child(&mut active, &a1, MessageNode::user("more"))
            .unwrap();
        assert_eq!(default_leaf(&pool, &u1), follow);
        assert_eq!(default_leaf(&pool, &follow), follow);
    }
}
