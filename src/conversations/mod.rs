use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use manager::ConversationManager;
pub use message::{ConversationId, Message, MessageId, ReplyRef, UserId};

use crate::tracking::ManualOverride;

mod manager;
mod message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub participants: Vec<UserId>,
    pub messages: Vec<Message>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    overrides: HashMap<MessageId, ManualOverride>,
}

impl Conversation {
    pub fn new(id: ConversationId, title: &str, participants: Vec<UserId>) -> Self {
        Self {
            id,
            title: title.to_string(),
            participants,
            messages: Vec::new(),
            last_activity: chrono::Utc::now(),
            overrides: HashMap::new(),
        }
    }

    pub fn add_message(&mut self, message: Message) {
        if message.timestamp > self.last_activity || self.messages.is_empty() {
            self.last_activity = message.timestamp;
        }

        // Most messages arrive in order; only search when one does not.
        if self
            .messages
            .last()
            .map_or(true, |last| last.timestamp <= message.timestamp)
        {
            self.messages.push(message);
        } else {
            let insert_pos = self
                .messages
                .binary_search_by(|existing| existing.timestamp.cmp(&message.timestamp))
                .unwrap_or_else(|e| e);
            self.messages.insert(insert_pos, message);
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.messages.iter().map(|m| m.id.0).max().unwrap_or(0) + 1)
    }

    /// The manual-override flag for a message, created on first use.
    pub fn manual_override(&mut self, id: MessageId) -> ManualOverride {
        self.overrides.entry(id).or_default().clone()
    }

    pub fn unread_count(&self, self_id: UserId) -> usize {
        self.messages
            .iter()
            .filter(|m| !m.read && !m.is_from(self_id))
            .count()
    }

    pub fn pinned(&self) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.pinned).collect()
    }
}
