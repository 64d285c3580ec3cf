use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{Conversation, ConversationId, Message, MessageId, ReplyRef, User, UserId};
use crate::tracking::MountedMessage;

pub struct ConversationManager {
    self_id: UserId,
    users: HashMap<UserId, User>,
    conversations: BTreeMap<ConversationId, Conversation>,
}

impl ConversationManager {
    pub fn new(self_id: UserId, users: Vec<User>, conversations: Vec<Conversation>) -> Self {
        Self {
            self_id,
            users: users.into_iter().map(|u| (u.id, u)).collect(),
            conversations: conversations.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    pub fn user_name(&self, id: UserId) -> &str {
        self.users.get(&id).map(|u| u.name.as_str()).unwrap_or("unknown")
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    /// Conversation ids, most recently active first.
    pub fn list_conversations(&self) -> Vec<ConversationId> {
        let mut ids: Vec<ConversationId> = self.conversations.keys().copied().collect();
        ids.sort_by(|a, b| {
            let a_activity = self.conversations.get(a).map(|c| c.last_activity);
            let b_activity = self.conversations.get(b).map(|c| c.last_activity);
            b_activity.cmp(&a_activity).then(a.cmp(b))
        });
        ids
    }

    pub fn unread_count(&self, id: ConversationId) -> usize {
        self.conversations
            .get(&id)
            .map(|c| c.unread_count(self.self_id))
            .unwrap_or(0)
    }

    pub fn total_unread(&self) -> usize {
        self.conversations
            .values()
            .map(|c| c.unread_count(self.self_id))
            .sum()
    }

    /// Idempotent: returns whether the flag actually changed.
    pub fn mark_read(&mut self, conversation: ConversationId, message: MessageId) -> bool {
        let Some(msg) = self
            .conversations
            .get_mut(&conversation)
            .and_then(|c| c.message_mut(message))
        else {
            return false;
        };
        if msg.read {
            return false;
        }
        msg.read = true;
        debug!(conversation = %conversation, message = %message, "message marked as read");
        true
    }

    /// Flip a message back to unread by hand. Sets the message's manual
    /// override so automatic tracking leaves it alone from now on.
    pub fn mark_unread(&mut self, conversation: ConversationId, message: MessageId) -> bool {
        let self_id = self.self_id;
        let Some(conv) = self.conversations.get_mut(&conversation) else {
            return false;
        };
        match conv.message(message) {
            Some(msg) if !msg.is_from(self_id) => {}
            _ => return false,
        }

        conv.manual_override(message).mark();
        if let Some(msg) = conv.message_mut(message) {
            msg.read = false;
        }
        debug!(conversation = %conversation, message = %message, "message marked as unread");
        true
    }

    pub fn toggle_pin(&mut self, conversation: ConversationId, message: MessageId) -> Option<bool> {
        let msg = self
            .conversations
            .get_mut(&conversation)
            .and_then(|c| c.message_mut(message))?;
        msg.pinned = !msg.pinned;
        Some(msg.pinned)
    }

    pub fn append_message(&mut self, conversation: ConversationId, message: Message) -> bool {
        match self.conversations.get_mut(&conversation) {
            Some(conv) => {
                conv.add_message(message);
                true
            }
            None => false,
        }
    }

    /// Add a message written by the local user, optionally quoting another.
    pub fn compose(
        &mut self,
        conversation: ConversationId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> Option<MessageId> {
        let reply = reply_to.and_then(|target| {
            let conv = self.conversations.get(&conversation)?;
            let quoted = conv.message(target)?;
            Some(ReplyRef::new(
                target,
                self.user_name(quoted.sender_id),
                &quoted.content,
            ))
        });

        let self_id = self.self_id;
        let conv = self.conversations.get_mut(&conversation)?;
        let id = conv.next_message_id();
        conv.add_message(Message {
            id,
            sender_id: self_id,
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            read: true,
            reply_to: reply,
            pinned: false,
        });
        Some(id)
    }

    /// Tracker inputs for every message of a conversation, in display order.
    pub fn mounted_messages(&mut self, conversation: ConversationId) -> Vec<MountedMessage> {
        let self_id = self.self_id;
        let Some(conv) = self.conversations.get_mut(&conversation) else {
            return Vec::new();
        };
        let ids: Vec<(MessageId, bool, bool)> = conv
            .messages
            .iter()
            .map(|m| (m.id, m.read, m.is_from(self_id)))
            .collect();
        ids.into_iter()
            .map(|(id, is_read, is_own)| MountedMessage {
                id,
                is_read,
                is_own,
                manual: conv.manual_override(id),
            })
            .collect()
    }

    pub fn participants(&self, conversation: ConversationId) -> Vec<&User> {
        self.conversations
            .get(&conversation)
            .map(|c| {
                c.participants
                    .iter()
                    .filter_map(|id| self.users.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn search(&self, conversation: ConversationId, query: &str) -> Vec<&Message> {
        let query = query.to_lowercase();
        self.conversations
            .get(&conversation)
            .map(|c| {
                c.messages
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&query))
                    .collect()
            })
            .unwrap_or_default()
    }
}
