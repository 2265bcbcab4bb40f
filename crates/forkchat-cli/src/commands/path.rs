//! /path command - show the visible conversation

use super::CommandResult;
use crate::utils::truncate_chars;
use forkchat_core::{Conversation, Role};

pub struct PathCommand;

impl PathCommand {
    pub fn execute(conversation: &Conversation) -> CommandResult {
        let path = conversation.visible_path();
        if path.is_empty() {
            return CommandResult::Message("No messages yet.".to_string());
        }

        let mut output = format!("{}\n", conversation.title);
        output.push_str(&"-".repeat(40));
        output.push('\n');

        for (i, node) in path.iter().enumerate() {
            let speaker = match node.role {
                Role::Assistant => node.model.as_str(),
                role => role.as_str(),
            };
            let branches = conversation
                .branch_info(&node.id)
                .map(|info| format!(" [{}/{}]", info.current_index + 1, info.total))
                .unwrap_or_default();
            let first_line = node.content.lines().next().unwrap_or("");
            output.push_str(&format!(
                "{:>3}. {}{}: {}\n",
                i + 1,
                speaker,
                branches,
                truncate_chars(first_line, 80)
            ));
        }
        CommandResult::Message(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::branched;

    #[test]
    fn test_path_lists_messages_with_branch_markers() {
        let CommandResult::Message(text) = PathCommand::execute(&branched()) else {
            panic!("expected a message");
        };
        assert!(text.contains("  1. user: Hello"));
        assert!(text.contains("  2. OpenAI: gpt-4o [2/2]: Hello!"));
    }

    #[test]
    fn test_empty_path() {
        let conv = Conversation::new("OpenAI: gpt-4o");
        assert_eq!(
            PathCommand::execute(&conv),
            CommandResult::Message("No messages yet.".into())
        );
    }
}
