//! Slash commands for interactive mode

mod branch;
mod edit;
mod path;

pub use branch::BranchCommand;
pub use edit::{EditCommand, RegenCommand};
pub use path::PathCommand;

use forkchat_core::{Conversation, MessageNode, NodeId};

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Show a message to the user
    Message(String),
    /// Regenerate an assistant reply
    Regenerate(NodeId),
    /// Branch a message with new content
    Edit(NodeId, String),
    /// Show another sibling of a message
    SwitchBranch(NodeId, usize),
    /// Generate a title now
    GenerateTitle,
    /// Toggle the archived flag
    ToggleArchive,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, conversation: &Conversation) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let (command, args) = match rest.split_once(' ') {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "path" | "p" => PathCommand::execute(conversation),

        "regen" | "r" => RegenCommand::execute(args, conversation),

        "edit" | "e" => EditCommand::execute(args, conversation),

        "branch" | "b" => BranchCommand::execute(args, conversation),

        "title" | "t" => CommandResult::GenerateTitle,

        "archive" => CommandResult::ToggleArchive,

        _ => CommandResult::Unknown(command),
    })
}

/// Resolve a 1-based position on the visible path
pub(crate) fn message_at<'a>(
    arg: &str,
    path: &[&'a MessageNode],
) -> Result<&'a MessageNode, String> {
    if path.is_empty() {
        return Err("No messages yet. Start a conversation first.".to_string());
    }
    let position: usize = arg
        .parse()
        .map_err(|_| format!("Invalid message number '{}'. Use 1-{}.", arg, path.len()))?;
    position
        .checked_sub(1)
        .and_then(|i| path.get(i).copied())
        .ok_or_else(|| format!("No message {}. Use 1-{}.", position, path.len()))
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?            Show this help message
  /path, /p                Show the visible conversation with message numbers
  /regen, /r <n>           Generate another reply in place of message n
  /edit, /e <n> <text>     Branch message n with new text
  /branch, /b <n> <index>  Show sibling <index> (0-based) of message n
  /title, /t               Generate a title now
  /archive                 Archive or unarchive this conversation
  /quit, /exit, /q         Exit forkchat

Examples:
  /regen 2                 Try again for the reply at position 2
  /edit 1 Hello there      Ask message 1 differently
  /branch 2 0              Go back to the first reply at position 2"#
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use forkchat_core::NodePatch;

    /// "Hello" -> {"Hi there", "Hello!"} with the second reply active
    pub(crate) fn branched() -> Conversation {
        let mut conv = Conversation::new("OpenAI: gpt-4o");
        let root = conv.root_id().clone();
        let user = conv.insert_child(&root, MessageNode::user("Hello")).unwrap();
        for text in ["Hi there", "Hello!"] {
            let id = conv
                .insert_child(&user, MessageNode::assistant_placeholder("OpenAI: gpt-4o"))
                .unwrap();
            conv.update_node(&id, NodePatch::finalize(text)).unwrap();
        }
        conv
    }

    #[test]
    fn test_non_commands_are_ignored() {
        assert!(execute_command("hello", &branched()).is_none());
    }

    #[test]
    fn test_simple_commands() {
        let conv = branched();
        assert_eq!(execute_command("/quit", &conv), Some(CommandResult::Exit));
        assert_eq!(execute_command(" /TITLE ", &conv), Some(CommandResult::GenerateTitle));
        assert_eq!(execute_command("/archive", &conv), Some(CommandResult::ToggleArchive));
        assert_eq!(
            execute_command("/frobnicate now", &conv),
            Some(CommandResult::Unknown("frobnicate".into()))
        );
        assert!(matches!(
            execute_command("/help", &conv),
            Some(CommandResult::Message(_))
        ));
    }

    #[test]
    fn test_message_at() {
        let conv = branched();
        let path = conv.visible_path();
        assert_eq!(message_at("1", &path).unwrap().content, "Hello");
        assert!(message_at("0", &path).is_err());
        assert!(message_at("3", &path).is_err());
        assert!(message_at("x", &path).is_err());
        assert!(message_at("1", &[]).is_err());
    }
}
