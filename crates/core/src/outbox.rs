use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::{InboundMessage, OutboundReply};

/// Sink for replies produced while handling one inbound message.
///
/// Implementations own delivery failures: they log and drop, the conversation
/// keeps going.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn say(&self, origin: &InboundMessage, reply: OutboundReply);
}

/// Keeps every reply in memory, in emission order.
#[derive(Default)]
pub struct RecordingOutbox {
    replies: Mutex<Vec<OutboundReply>>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replies(&self) -> Vec<OutboundReply> {
        self.replies.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.replies.lock().await.iter().map(|reply| reply.text.clone()).collect()
    }

    /// Returns and clears everything recorded so far.
    pub async fn drain(&self) -> Vec<OutboundReply> {
        std::mem::take(&mut *self.replies.lock().await)
    }
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn say(&self, _origin: &InboundMessage, reply: OutboundReply) {
        self.replies.lock().await.push(reply);
    }
}
