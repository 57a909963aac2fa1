//! Chat data model: identities, messages, and rooms.
//!
//! Field names serialize in camelCase so the durable room collection keeps the
//! `{id, name, messages[], activeUsers[]}` layout.

use serde::{Deserialize, Serialize};

/// Per-room retention: only the most recent messages are kept.
pub const MAX_ROOM_MESSAGES: usize = 100;

/// Device/session identity. Generated once and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// One chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub user_id: String,
    pub username: String,
}

/// A named room with its message window and active users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub active_users: Vec<String>,
}

impl ChatRoom {
    /// Empty room with no messages and no active users.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            messages: Vec::new(),
            active_users: Vec::new(),
        }
    }

    /// Append a message, evicting from the front past `MAX_ROOM_MESSAGES`.
    pub fn push_message(&mut self, msg: ChatMessage) {
        self.messages.push(msg);
        if self.messages.len() > MAX_ROOM_MESSAGES {
            let excess = self.messages.len() - MAX_ROOM_MESSAGES;
            self.messages.drain(..excess);
        }
    }

    /// Returns true if the user was not present before.
    pub fn add_active_user(&mut self, user_id: &str) -> bool {
        if self.active_users.iter().any(|u| u == user_id) {
            return false;
        }
        self.active_users.push(user_id.to_string());
        true
    }

    /// Returns true if the user was present before.
    pub fn remove_active_user(&mut self, user_id: &str) -> bool {
        let before = self.active_users.len();
        self.active_users.retain(|u| u != user_id);
        self.active_users.len() != before
    }
}

/// Room ids are pre-assigned slugs: lowercase ascii letters, digits, and `-`.
pub fn is_valid_room_slug(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('-')
        && !id.ends_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
