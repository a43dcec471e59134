//! JSON-file conversation store.
//!
//! Each chat is one pretty-printed JSON file under the chats directory,
//! named by its id. The core only emits text; the chat loop appends the
//! streamed turns here after each session ends.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }
}

/// Stores and loads chats as JSON files.
pub struct ChatStore {
    storage_dir: PathBuf,
}

impl ChatStore {
    pub fn new(storage_dir: &Path) -> Result<Self> {
        fs::create_dir_all(storage_dir)
            .with_context(|| format!("Failed to create chats directory {}", storage_dir.display()))?;
        Ok(Self {
            storage_dir: storage_dir.to_path_buf(),
        })
    }

    pub fn create(&self, name: &str) -> Result<Chat> {
        let now = unix_now();
        let chat = Chat {
            id: format!("{now:08x}-{:04x}", std::process::id() as u16),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.save(&chat)?;
        Ok(chat)
    }

    pub fn save(&self, chat: &Chat) -> Result<()> {
        let mut chat = chat.clone();
        chat.updated_at = unix_now();

        let path = self.chat_path(&chat.id);
        let json = serde_json::to_string_pretty(&chat)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load(&self, chat_id: &str) -> Result<Option<Chat>> {
        let path = self.chat_path(chat_id);
        if !path.exists() {
            return Ok(None);
        }

        let contents =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let chat = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed chat file {}", path.display()))?;
        Ok(Some(chat))
    }

    pub fn delete(&self, chat_id: &str) -> Result<bool> {
        let path = self.chat_path(chat_id);
        if path.exists() {
            fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Lists stored chats, most recently updated first. Unreadable files are
    /// skipped.
    pub fn list(&self) -> Result<Vec<Chat>> {
        let mut chats = Vec::new();
        for entry in fs::read_dir(&self.storage_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Ok(contents) = fs::read_to_string(&path) {
                    if let Ok(chat) = serde_json::from_str::<Chat>(&contents) {
                        chats.push(chat);
                    }
                }
            }
        }

        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    fn chat_path(&self, chat_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{chat_id}.json"))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
