use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use henry_core::message::{InboundMessage, MessageContext};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::lanes::{ConversationLanes, LaneError, Submission};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// Parses the `event` object of an Events API callback. `app_mention`
    /// duplicates a `message` event Slack also sends, so it stays unsupported.
    pub fn from_event_json(event: &Value) -> Self {
        let event_type = str_field(event, "type").unwrap_or_default();
        if event_type != "message" {
            return Self::Unsupported { event_type };
        }

        Self::Message(MessageEvent {
            channel_id: str_field(event, "channel").unwrap_or_default(),
            channel_type: str_field(event, "channel_type"),
            user_id: str_field(event, "user"),
            text: str_field(event, "text").unwrap_or_default(),
            bot_id: str_field(event, "bot_id"),
            subtype: str_field(event, "subtype"),
            ts: str_field(event, "ts").unwrap_or_default(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub channel_type: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub ts: String,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Turns a raw message event into what the bot sees, or `None` for events the
/// bot must not answer: its own posts, other bots, edits and other subtypes.
pub fn classify_message(event: &MessageEvent, bot_user_id: &str) -> Option<InboundMessage> {
    if event.bot_id.is_some() || event.subtype.is_some() {
        return None;
    }
    let user_id = event.user_id.as_deref().filter(|user| !user.is_empty())?;
    if user_id == bot_user_id || event.channel_id.is_empty() {
        return None;
    }

    let text = event.text.trim();
    let (context, text) = if let Some(rest) = strip_leading_mention(text, bot_user_id) {
        (MessageContext::DirectMention, rest)
    } else if is_direct_channel(event) {
        (MessageContext::DirectMessage, text)
    } else if mentions(text, bot_user_id) {
        (MessageContext::Mention, text)
    } else {
        (MessageContext::Ambient, text)
    };

    Some(InboundMessage::new(user_id, event.channel_id.as_str(), context, text))
}

fn is_direct_channel(event: &MessageEvent) -> bool {
    match event.channel_type.as_deref() {
        Some(channel_type) => channel_type == "im",
        None => event.channel_id.starts_with('D'),
    }
}

fn mentions(text: &str, bot_user_id: &str) -> bool {
    text.contains(&format!("<@{bot_user_id}>")) || text.contains(&format!("<@{bot_user_id}|"))
}

/// `<@BOT> hi`, `<@BOT|henry>: hi` and `<@BOT>, hi` all leave `hi`.
fn strip_leading_mention<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let rest = text.strip_prefix("<@")?.strip_prefix(bot_user_id)?;
    let rest = match rest.strip_prefix('>') {
        Some(rest) => rest,
        None => {
            let label = rest.strip_prefix('|')?;
            let end = label.find('>')?;
            &label[end + 1..]
        }
    };
    Some(rest.trim_start_matches(|ch: char| ch == ':' || ch == ',' || ch.is_whitespace()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// Handed to a conversation lane.
    Queued,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("conversation lane rejected message: {0}")]
    Lane(#[from] LaneError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired to feed chat messages into `lanes`.
pub fn message_dispatcher(lanes: Arc<ConversationLanes>, bot_user_id: &str) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(lanes, bot_user_id));
    dispatcher
}

pub struct MessageHandler {
    lanes: Arc<ConversationLanes>,
    bot_user_id: String,
}

impl MessageHandler {
    pub fn new(lanes: Arc<ConversationLanes>, bot_user_id: impl Into<String>) -> Self {
        Self { lanes, bot_user_id: bot_user_id.into() }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let Some(message) = classify_message(event, &self.bot_user_id) else {
            debug!(
                event_name = "ingress.slack.message_skipped",
                correlation_id = %ctx.correlation_id,
                subtype = event.subtype.as_deref().unwrap_or("none"),
                "skipping message not addressed to the bot"
            );
            return Ok(HandlerResult::Ignored);
        };

        match self.lanes.submit(message).await? {
            Submission::Queued => Ok(HandlerResult::Queued),
            Submission::Skipped => Ok(HandlerResult::Ignored),
        }
    }
}
