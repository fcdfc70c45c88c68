use serde::{Deserialize, Serialize};

pub const BOT_USERNAME: &str = "henry-bot";
pub const ACCENT_COLOR: &str = "#7CD197";

/// How a message reached the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContext {
    DirectMessage,
    DirectMention,
    Mention,
    Ambient,
}

impl MessageContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::DirectMention => "direct_mention",
            Self::Mention => "mention",
            Self::Ambient => "ambient",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    pub channel_id: String,
    pub context: MessageContext,
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        context: MessageContext,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            context,
            text: text.into(),
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey { user_id: self.user_id.clone(), channel_id: self.channel_id.clone() }
    }
}

/// Identifies the conversation a message belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub channel_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn title_link(mut self, link: impl Into<String>) -> Self {
        self.title_link = Some(link.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// A reply handed to the transport for delivery. Not retained after sending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutboundReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), username: None, attachments: Vec::new() }
    }

    pub fn rich(text: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            text: text.into(),
            username: Some(BOT_USERNAME.to_owned()),
            attachments: vec![attachment],
        }
    }

    pub fn is_plain(&self) -> bool {
        self.attachments.is_empty()
    }
}

impl From<&str> for OutboundReply {
    fn from(text: &str) -> Self {
        OutboundReply::text(text)
    }
}

impl From<String> for OutboundReply {
    fn from(text: String) -> Self {
        OutboundReply::text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::{Attachment, InboundMessage, MessageContext, OutboundReply, BOT_USERNAME};

    #[test]
    fn session_key_pairs_user_and_channel() {
        let message = InboundMessage::new("U1", "D1", MessageContext::DirectMessage, "hi");
        let key = message.session_key();

        assert_eq!(key.user_id, "U1");
        assert_eq!(key.channel_id, "D1");
    }

    #[test]
    fn rich_reply_serializes_without_empty_attachment_fields() {
        let reply = OutboundReply::rich(
            "rating: 4.5",
            Attachment::new().title("Lou's").color("#7CD197"),
        );
        let json = serde_json::to_value(&reply).expect("serialize reply");

        assert_eq!(json["username"], BOT_USERNAME);
        assert_eq!(json["attachments"][0]["title"], "Lou's");
        assert!(json["attachments"][0].get("image_url").is_none());
    }

    #[test]
    fn plain_reply_omits_attachments() {
        let json = serde_json::to_value(OutboundReply::text("hello")).expect("serialize reply");
        assert!(json.get("attachments").is_none());
        assert!(OutboundReply::text("hello").is_plain());
    }
}
