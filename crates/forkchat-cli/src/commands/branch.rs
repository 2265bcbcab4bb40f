//! /branch command - switch between sibling messages

use super::{CommandResult, message_at};
use forkchat_core::Conversation;

pub struct BranchCommand;

impl BranchCommand {
    /// Execute /branch command
    /// - One arg: list the siblings at that position
    /// - Two args: switch to sibling `index` (0-based)
    pub fn execute(args: &str, conversation: &Conversation) -> CommandResult {
        let mut parts = args.split_whitespace();
        let Some(position) = parts.next() else {
            return CommandResult::Message("Usage: /branch <n> [index]".to_string());
        };

        let path = conversation.visible_path();
        let node = match message_at(position, &path) {
            Ok(node) => node,
            Err(e) => return CommandResult::Message(e),
        };
        let Some(info) = conversation.branch_info(&node.id) else {
            return CommandResult::Message(format!("Message {} has no alternatives.", position));
        };

        match parts.next() {
            None => CommandResult::Message(format!(
                "Message {} is branch {} of {}. Switch with /branch {} <0-{}>.",
                position,
                info.current_index,
                info.total,
                position,
                info.total - 1
            )),
            Some(index) => match index.parse::<usize>() {
                Ok(index) if index < info.total => {
                    CommandResult::SwitchBranch(node.id.clone(), index)
                }
                _ => CommandResult::Message(format!(
                    "Invalid index '{}'. Valid range: 0-{}",
                    index,
                    info.total - 1
                )),
            },
        }
    }
}
