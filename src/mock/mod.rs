//! Seeded users, conversations and templates standing in for a backend.

use anyhow::{Context, Result};
use serde::Deserialize;

pub use responder::{IncomingReply, Responder};

use crate::conversations::{Conversation, ConversationId, Message, MessageId, ReplyRef, User, UserId};

mod responder;

const MOCK_DATA: &str = include_str!("data.json");

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub name: String,
    pub body: String,
}

pub struct MockData {
    pub self_id: UserId,
    pub users: Vec<User>,
    pub conversations: Vec<Conversation>,
    pub templates: Vec<Template>,
    pub canned_replies: Vec<String>,
}

#[derive(Deserialize)]
struct RawData {
    self_id: UserId,
    users: Vec<User>,
    conversations: Vec<RawConversation>,
    templates: Vec<Template>,
    canned_replies: Vec<String>,
}

#[derive(Deserialize)]
struct RawConversation {
    id: ConversationId,
    title: String,
    participants: Vec<UserId>,
    messages: Vec<RawMessage>,
}

#[derive(Deserialize)]
struct RawMessage {
    id: MessageId,
    sender_id: UserId,
    content: String,
    minutes_ago: i64,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    reply_to: Option<ReplyRef>,
}

/// Build the mock data set with timestamps relative to now.
pub fn seed() -> Result<MockData> {
    parse(MOCK_DATA, chrono::Utc::now())
}

fn parse(raw: &str, now: chrono::DateTime<chrono::Utc>) -> Result<MockData> {
    let data: RawData = serde_json::from_str(raw).context("Failed to parse mock data")?;

    let conversations = data
        .conversations
        .into_iter()
        .map(|raw| {
            let mut conversation = Conversation::new(raw.id, &raw.title, raw.participants);
            for m in raw.messages {
                conversation.add_message(Message {
                    id: m.id,
                    sender_id: m.sender_id,
                    content: m.content,
                    timestamp: now - chrono::Duration::minutes(m.minutes_ago),
                    // Own messages are always read.
                    read: m.read || m.sender_id == data.self_id,
                    reply_to: m.reply_to,
                    pinned: m.pinned,
                });
            }
            conversation
        })
        .collect();

    Ok(MockData {
        self_id: data.self_id,
        users: data.users,
        conversations,
        templates: data.templates,
        canned_replies: data.canned_replies,
    })
}
