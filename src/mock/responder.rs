use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::conversations::{ConversationId, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingReply {
    pub conversation: ConversationId,
    pub sender_id: UserId,
    pub content: String,
}

/// Stub backend: answers every sent message with a canned reply after a
/// fixed delay.
#[derive(Clone)]
pub struct Responder {
    delay: Duration,
    replies: Vec<String>,
    reply_tx: mpsc::UnboundedSender<IncomingReply>,
}

impl Responder {
    const FALLBACK_REPLY: &'static str = "ok";

    pub fn new(
        delay: Duration,
        replies: Vec<String>,
        reply_tx: mpsc::UnboundedSender<IncomingReply>,
    ) -> Self {
        Self {
            delay,
            replies,
            reply_tx,
        }
    }

    /// Fire-and-forget; the reply shows up on the channel once the delay
    /// has passed. Nothing is sent if `candidates` is empty.
    pub fn schedule_reply(
        &self,
        conversation: ConversationId,
        candidates: &[UserId],
    ) -> Option<JoinHandle<()>> {
        let mut rng = rand::thread_rng();
        let sender_id = *candidates.choose(&mut rng)?;
        let content = self
            .replies
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| Self::FALLBACK_REPLY.to_string());

        let delay = self.delay;
        let reply_tx = self.reply_tx.clone();
        debug!(conversation = %conversation, sender = %sender_id, ?delay, "scheduling canned reply");
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = reply_tx.send(IncomingReply {
                conversation,
                sender_id,
                content,
            });
        }))
    }
}
