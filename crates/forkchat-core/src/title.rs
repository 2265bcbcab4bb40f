//! Automatic conversation titles.

use forkchat_ai::{ChatMessage, CompletionRequest};

use crate::node::MessageNode;

/// Title of a conversation that has not been named yet
pub const DEFAULT_TITLE: &str = "New Chat";
/// Visible-path length at which a title is generated
pub const DEFAULT_TITLE_THRESHOLD: usize = 2;
/// Messages from the start of the path sent as the title sample
pub const TITLE_SAMPLE_MESSAGES: usize = 4;
/// Per-message character cap in the title sample
pub const TITLE_SAMPLE_CHARS: usize = 500;
/// Character cap on a stored title
pub const MAX_TITLE_CHARS: usize = 80;

const TITLE_TEMPERATURE: f32 = 0.3;
const TITLE_MAX_TOKENS: u32 = 32;

const TITLE_PROMPT: &str = "Write a short title (at most six words) for the conversation below. \
Reply with the title only: no quotes, no trailing punctuation.";

/// Whether growing the path from `previous` to `current` messages crosses `threshold`
pub fn crosses_threshold(previous: usize, current: usize, threshold: usize) -> bool {
    previous < threshold && threshold <= current
}

/// First messages of the path, each truncated
pub fn sample_messages(path: &[&MessageNode]) -> Vec<ChatMessage> {
    path.iter()
        .filter_map(|node| node.to_chat_message())
        .take(TITLE_SAMPLE_MESSAGES)
        .map(|mut msg| {
            msg.content = truncate_chars(&msg.content, TITLE_SAMPLE_CHARS);
            msg
        })
        .collect()
}

/// Buffered request asking `model` (prefix already stripped) for a title
pub fn title_request(model: &str, path: &[&MessageNode]) -> CompletionRequest {
    let transcript = sample_messages(path)
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    CompletionRequest::buffered(
        model,
        vec![ChatMessage::system(TITLE_PROMPT), ChatMessage::user(transcript)],
        TITLE_TEMPERATURE,
        TITLE_MAX_TOKENS,
    )
}

/// Normalize a model reply into a title; `None` if nothing usable remains
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Title:")
        .or_else(|| line.strip_prefix("title:"))
        .unwrap_or(line)
        .trim();
    let unquoted = line
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’' | '*'))
        .trim();
    if unquoted.is_empty() {
        return None;
    }
    Some(truncate_chars(unquoted, MAX_TITLE_CHARS).trim_end().to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_crossing() {
        assert!(crosses_threshold(0, 2, 2));
        assert!(crosses_threshold(1, 3, 2));
        assert!(!crosses_threshold(2, 4, 2));
        assert!(!crosses_threshold(0, 1, 2));
    }

    #[test]
    fn test_sample_takes_first_four_and_truncates() {
        let long = "x".repeat(TITLE_SAMPLE_CHARS + 20);
        let nodes: Vec<MessageNode> = (0..6)
            .map(|i| MessageNode::user(if i == 0 { long.clone() } else { i.to_string() }))
            .collect();
        let path: Vec<&MessageNode> = nodes.iter().collect();

        let sample = sample_messages(&path);
        assert_eq!(sample.len(), TITLE_SAMPLE_MESSAGES);
        assert_eq!(sample[0].content.chars().count(), TITLE_SAMPLE_CHARS);
        assert_eq!(sample[3].content, "3");
    }

    #[test]
    fn test_title_request_is_buffered() {
        let node = MessageNode::user("How do I bake bread?");
        let request = title_request("gpt-4o", &[&node]);
        assert!(!request.stream);
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.contains("bake bread"));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  \"Baking Bread\"  ").as_deref(), Some("Baking Bread"));
        assert_eq!(clean_title("Title: Sourdough\nextra").as_deref(), Some("Sourdough"));
        assert_eq!(clean_title("“Quoted”").as_deref(), Some("Quoted"));
        assert_eq!(clean_title("   \n \"\" "), None);

        let long = "word ".repeat(40);
        assert!(clean_title(&long).unwrap().chars().count() <= MAX_TITLE_CHARS);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
