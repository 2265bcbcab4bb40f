//! /regen and /edit commands - create new branches

use super::{CommandResult, message_at};
use forkchat_core::{Conversation, Role};

pub struct RegenCommand;

impl RegenCommand {
    /// `/regen <n>`: message n must be an assistant reply
    pub fn execute(args: &str, conversation: &Conversation) -> CommandResult {
        let path = conversation.visible_path();
        match message_at(args, &path) {
            Ok(node) if node.role == Role::Assistant => CommandResult::Regenerate(node.id.clone()),
            Ok(_) => CommandResult::Message(format!("Message {} is not a reply.", args)),
            Err(e) => CommandResult::Message(e),
        }
    }
}

pub struct EditCommand;

impl EditCommand {
    /// `/edit <n> <text>`: message n must be a user or system message
    pub fn execute(args: &str, conversation: &Conversation) -> CommandResult {
        let Some((position, text)) = args.split_once(' ') else {
            return CommandResult::Message("Usage: /edit <n> <text>".to_string());
        };
        let text = text.trim();
        if text.is_empty() {
            return CommandResult::Message("Usage: /edit <n> <text>".to_string());
        }

        let path = conversation.visible_path();
        match message_at(position, &path) {
            Ok(node) if matches!(node.role, Role::User | Role::System) => {
                CommandResult::Edit(node.id.clone(), text.to_string())
            }
            Ok(_) => CommandResult::Message(format!(
                "Message {} is a reply; use /regen {} instead.",
                position, position
            )),
            Err(e) => CommandResult::Message(e),
        }
    }
}
