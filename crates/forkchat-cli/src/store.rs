//! Conversation storage: one pretty-printed JSON file per conversation

use anyhow::Context;
use forkchat_core::{Conversation, StoredConversation};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory-backed conversation store
pub struct ConversationStore {
    dir: PathBuf,
}

/// Summary of a saved conversation
#[derive(Debug, Clone)]
pub struct ConversationInfo {
    pub id: String,
    pub title: String,
    pub model: String,
    pub updated_at: i64,
    pub message_count: usize,
    pub is_archived: bool,
}

impl ConversationInfo {
    /// Format the updated_at timestamp for display
    pub fn updated_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.updated_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl ConversationStore {
    /// Get the default conversations directory
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forkchat")
            .join("conversations")
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write the conversation, replacing any previous save
    pub fn save(&self, conversation: &Conversation) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(&conversation.id);
        let json = serde_json::to_string_pretty(&conversation.to_stored())?;

        // Write a sibling file, then rename it over the target
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, id: &str) -> anyhow::Result<Conversation> {
        let stored = self.read(&self.path_for(id))?;
        Conversation::from_stored(stored)
            .with_context(|| format!("Conversation {} is corrupt", id))
    }

    fn read(&self, path: &Path) -> anyhow::Result<StoredConversation> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Conversation not found: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// List saved conversations, newest first
    pub fn list(&self) -> anyhow::Result<Vec<ConversationInfo>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut conversations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).and_then(|stored| {
                Conversation::from_stored(stored).map_err(anyhow::Error::from)
            }) {
                Ok(conversation) => conversations.push(ConversationInfo {
                    message_count: conversation.message_count(),
                    id: conversation.id,
                    title: conversation.title,
                    model: conversation.model,
                    updated_at: conversation.updated_at,
                    is_archived: conversation.is_archived,
                }),
                Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
            }
        }

        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    /// Delete a conversation
    pub fn delete(&self, id: &str) -> anyhow::Result<()> {
        let path = self.path_for(id);
        fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))
    }
}
