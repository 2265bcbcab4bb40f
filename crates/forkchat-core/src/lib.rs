//! forkchat-core: branching conversation store and streaming chat session
//!
//! A conversation is a tree of alternative continuations held in a flat node
//! pool. The branch selector picks one child per branching point, which
//! yields the single visible path. The chat session mutates the tree (send,
//! regenerate, edit, switch) and streams replies into it.

pub mod branch;
pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod node;
pub mod persist;
pub mod pool;
pub mod session;
pub mod title;

pub use branch::{ActiveBranchMap, BranchInfo};
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use handle::ChatHandle;
pub use node::{MessageNode, NodeId, NodePatch, Role};
pub use persist::{StoredConversation, StoredNode};
pub use pool::NodePool;
pub use session::{ChatSession, Generation, GenerationSettings, Mutation};
