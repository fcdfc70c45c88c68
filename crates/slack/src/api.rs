use std::time::Duration;

use async_trait::async_trait;
use henry_core::errors::DeliveryError;
use henry_core::lookup::{LookupError, UserDirectory};
use henry_core::message::{Attachment, InboundMessage, OutboundReply};
use henry_core::Outbox;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("slack api request failed: {0}")]
    Transport(String),
    #[error("slack api `{method}` returned error `{error}`")]
    Method { method: String, error: String },
    #[error("slack api `{method}` response could not be decoded: {message}")]
    Decode { method: String, message: String },
}

/// Who the bot is, as reported by `auth.test`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub team: Option<String>,
}

/// Body of a `chat.postMessage` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PostMessage<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "no_attachments")]
    pub attachments: &'a [Attachment],
}

impl<'a> PostMessage<'a> {
    pub fn new(channel: &'a str, reply: &'a OutboundReply) -> Self {
        Self {
            channel,
            text: &reply.text,
            username: reply.username.as_deref(),
            attachments: &reply.attachments,
        }
    }
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    rest: Value,
}

#[derive(Clone, Debug)]
pub struct SlackApiClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    app_token: SecretString,
}

impl SlackApiClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        app_token: SecretString,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|error| ApiError::Transport(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, bot_token, app_token })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call(
        &self,
        method: &str,
        token: &SecretString,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, ApiError> {
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|error| ApiError::Transport(error.to_string()))?;

        let envelope: ApiEnvelope = response.json().await.map_err(|error| ApiError::Decode {
            method: method.to_string(),
            message: error.to_string(),
        })?;

        if !envelope.ok {
            return Err(ApiError::Method {
                method: method.to_string(),
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        Ok(envelope.rest)
    }

    /// Verifies the bot token and returns the bot's own user id.
    pub async fn auth_test(&self) -> Result<BotIdentity, ApiError> {
        let method = "auth.test";
        let body = self.call(method, &self.bot_token, self.http.post(self.url(method))).await?;
        let user_id = body.get("user_id").and_then(Value::as_str).ok_or_else(|| {
            ApiError::Decode { method: method.to_string(), message: "missing user_id".to_string() }
        })?;

        Ok(BotIdentity {
            user_id: user_id.to_string(),
            team: body.get("team").and_then(Value::as_str).map(str::to_owned),
        })
    }

    /// Requests a Socket Mode WebSocket URL with the app-level token.
    pub async fn open_connection(&self) -> Result<String, ApiError> {
        let method = "apps.connections.open";
        let body = self.call(method, &self.app_token, self.http.post(self.url(method))).await?;
        body.get("url").and_then(Value::as_str).map(str::to_owned).ok_or_else(|| {
            ApiError::Decode { method: method.to_string(), message: "missing url".to_string() }
        })
    }

    pub async fn post_message(&self, channel: &str, reply: &OutboundReply) -> Result<(), ApiError> {
        let method = "chat.postMessage";
        let request = self.http.post(self.url(method)).json(&PostMessage::new(channel, reply));
        self.call(method, &self.bot_token, request).await.map(|_| ())
    }

    pub async fn user_first_name(&self, user_id: &str) -> Result<Option<String>, ApiError> {
        let method = "users.info";
        let request = self.http.get(self.url(method)).query(&[("user", user_id)]);
        let body = self.call(method, &self.bot_token, request).await?;

        Ok(body
            .pointer("/user/profile/first_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned))
    }
}

#[async_trait]
impl UserDirectory for SlackApiClient {
    async fn first_name(&self, user_id: &str) -> Result<Option<String>, LookupError> {
        self.user_first_name(user_id).await.map_err(|error| match error {
            ApiError::Transport(message) => LookupError::Transport(message),
            ApiError::Method { error, .. } => LookupError::Status { status: 200, message: error },
            ApiError::Decode { message, .. } => LookupError::Decode(message),
        })
    }
}

/// Delivers replies with `chat.postMessage` to the channel they came from.
#[derive(Clone, Debug)]
pub struct SlackOutbox {
    client: SlackApiClient,
}

impl SlackOutbox {
    pub fn new(client: SlackApiClient) -> Self {
        Self { client }
    }

    pub async fn deliver(
        &self,
        origin: &InboundMessage,
        reply: &OutboundReply,
    ) -> Result<(), DeliveryError> {
        self.client.post_message(&origin.channel_id, reply).await.map_err(|error| match error {
            ApiError::Method { error, .. } => DeliveryError::Rejected(error),
            other => DeliveryError::Transport(other.to_string()),
        })
    }
}

#[async_trait]
impl Outbox for SlackOutbox {
    async fn say(&self, origin: &InboundMessage, reply: OutboundReply) {
        match self.deliver(origin, &reply).await {
            Ok(()) => debug!(
                event_name = "egress.slack.reply_sent",
                channel_id = %origin.channel_id,
                attachments = reply.attachments.len(),
                "reply delivered"
            ),
            Err(error) => warn!(
                event_name = "egress.slack.reply_failed",
                channel_id = %origin.channel_id,
                user_id = %origin.user_id,
                error = %error,
                "reply delivery failed; dropping"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use henry_core::lookup::UserDirectory;
    use henry_core::message::{Attachment, InboundMessage, MessageContext, OutboundReply};
    use henry_core::DeliveryError;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ApiError, PostMessage, SlackApiClient, SlackOutbox};

    fn client(server: &MockServer) -> SlackApiClient {
        SlackApiClient::new(
            server.uri(),
            "xoxb-test".to_string().into(),
            "xapp-test".to_string().into(),
        )
        .expect("client")
    }

    #[test]
    fn post_message_payload_omits_empty_fields() {
        let plain = OutboundReply::text("Hello there!");
        let json = serde_json::to_value(PostMessage::new("D1", &plain)).expect("json");
        assert_eq!(json, json!({"channel": "D1", "text": "Hello there!"}));

        let rich = OutboundReply::rich("rating: 4.5", Attachment::new().title("Lou's"));
        let json = serde_json::to_value(PostMessage::new("D1", &rich)).expect("json");
        assert_eq!(json["username"], "henry-bot");
        assert_eq!(json["attachments"][0]["title"], "Lou's");
    }

    #[tokio::test]
    async fn auth_test_returns_bot_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "user_id": "UHENRY", "team": "Dartmouth"
            })))
            .mount(&server)
            .await;

        let identity = client(&server).auth_test().await.expect("auth");

        assert_eq!(identity.user_id, "UHENRY");
        assert_eq!(identity.team.as_deref(), Some("Dartmouth"));
    }

    #[tokio::test]
    async fn auth_failure_is_a_method_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let error = client(&server).auth_test().await.expect_err("invalid auth");

        assert_eq!(
            error,
            ApiError::Method { method: "auth.test".to_string(), error: "invalid_auth".to_string() }
        );
    }

    #[tokio::test]
    async fn open_connection_uses_app_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .and(header("authorization", "Bearer xapp-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "url": "wss://wss.slack.test/link/?ticket=abc"
            })))
            .mount(&server)
            .await;

        let url = client(&server).open_connection().await.expect("url");

        assert_eq!(url, "wss://wss.slack.test/link/?ticket=abc");
    }

    #[tokio::test]
    async fn first_name_comes_from_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("user", "U1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": {"id": "U1", "profile": {"first_name": "Ada", "real_name": "Ada L"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("user", "U2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": {"id": "U2", "profile": {"first_name": ""}}
            })))
            .mount(&server)
            .await;

        let client = client(&server);

        assert_eq!(client.first_name("U1").await, Ok(Some("Ada".to_string())));
        assert_eq!(client.first_name("U2").await, Ok(None));
    }

    #[tokio::test]
    async fn outbox_posts_reply_to_origin_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_partial_json(json!({"channel": "C7", "text": "Guess again!"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let outbox = SlackOutbox::new(client(&server));
        let origin = InboundMessage::new("U1", "C7", MessageContext::Mention, "red");

        outbox
            .deliver(&origin, &OutboundReply::text("Guess again!"))
            .await
            .expect("delivered");
    }

    #[tokio::test]
    async fn rejected_delivery_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "channel_not_found"})),
            )
            .mount(&server)
            .await;

        let outbox = SlackOutbox::new(client(&server));
        let origin = InboundMessage::new("U1", "C404", MessageContext::Mention, "hi");

        let error =
            outbox.deliver(&origin, &OutboundReply::text("hi")).await.expect_err("rejected");
        assert_eq!(error, DeliveryError::Rejected("channel_not_found".to_string()));
    }
}
