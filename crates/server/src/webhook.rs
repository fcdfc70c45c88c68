//! HTTP side of the Slack integration.
//!
//! `/slack/receive` answers outgoing webhooks and slash commands with filler
//! text. `/slack/events` accepts the Events API for workspaces that deliver
//! over HTTP instead of Socket Mode; its messages join the same lanes. The
//! events route is mounted only when a signing secret is configured, and
//! every delivery must carry a valid Slack signature.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Form, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use henry_slack::events::{EventContext, HandlerResult};
use henry_slack::{EventDispatcher, SlackEnvelope, SlackEvent};
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::health;
use crate::signature::RequestVerifier;

pub const YAWN: &str = "**Yawn**";
const RECENT_EVENT_CAPACITY: usize = 512;

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<EventDispatcher>,
    verifier: Option<RequestVerifier>,
    recent: Arc<RecentEvents>,
}

impl WebhookState {
    /// Without a signing secret the events route stays unmounted.
    pub fn new(dispatcher: Arc<EventDispatcher>, signing_secret: Option<SecretString>) -> Self {
        Self {
            dispatcher,
            verifier: signing_secret.map(RequestVerifier::new),
            recent: Arc::new(RecentEvents::new(RECENT_EVENT_CAPACITY)),
        }
    }
}

/// Bounded memory of Events API ids already accepted, oldest forgotten first.
/// Slack redelivers an event when its first 200 arrives late.
pub struct RecentEvents {
    capacity: usize,
    seen: Mutex<(HashSet<String>, VecDeque<String>)>,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, seen: Mutex::new((HashSet::new(), VecDeque::new())) }
    }

    /// Returns false when `event_id` was already recorded.
    pub async fn record(&self, event_id: &str) -> bool {
        let mut guard = self.seen.lock().await;
        let (ids, order) = &mut *guard;
        if !ids.insert(event_id.to_string()) {
            return false;
        }
        order.push_back(event_id.to_string());
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                ids.remove(&oldest);
            }
        }
        true
    }

    pub async fn forget(&self, event_id: &str) {
        let mut guard = self.seen.lock().await;
        let (ids, order) = &mut *guard;
        if ids.remove(event_id) {
            order.retain(|id| id != event_id);
        }
    }
}

pub fn router(state: WebhookState) -> Router {
    let mut router = Router::new().route("/slack/receive", post(receive));
    if state.verifier.is_some() {
        router = router.route("/slack/events", post(events));
    }
    router.route("/health", get(health::health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: WebhookState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.webhook.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        events_enabled = state.verifier.is_some(),
        "webhook endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.webhook.error",
                correlation_id = "bootstrap",
                error = %error,
                "webhook server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Outgoing webhooks carry `trigger_word`; slash commands carry `command`.
pub async fn receive(Form(form): Form<HashMap<String, String>>) -> Response {
    if let Some(command) = form.get("command") {
        info!(event_name = "ingress.webhook.slash_command", command = %command, "slash command");
        return Json(json!({ "response_type": "ephemeral", "text": YAWN })).into_response();
    }
    if form.contains_key("trigger_word") {
        info!(
            event_name = "ingress.webhook.outgoing",
            channel = form.get("channel_name").map(String::as_str).unwrap_or("unknown"),
            "outgoing webhook"
        );
        return Json(json!({ "text": YAWN })).into_response();
    }
    StatusCode::OK.into_response()
}

pub async fn events(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(verifier) = &state.verifier else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Err(error) = verifier.verify(&headers, &body, Utc::now()) {
        warn!(
            event_name = "ingress.webhook.signature_rejected",
            error = %error,
            "rejecting unsigned or forged events delivery"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(error) => {
            warn!(event_name = "ingress.webhook.malformed", error = %error, "events body is not json");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match body.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = body.get("challenge").cloned().unwrap_or(Value::Null);
            Json(json!({ "challenge": challenge })).into_response()
        }
        Some("event_callback") => {
            let Some(event) = body.get("event") else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let event_id = body.get("event_id").and_then(Value::as_str).map(str::to_string);
            if let Some(event_id) = &event_id {
                if !state.recent.record(event_id).await {
                    debug!(
                        event_name = "ingress.webhook.duplicate",
                        correlation_id = %event_id,
                        retry_num = header_str(&headers, "x-slack-retry-num").unwrap_or("none"),
                        "dropping redelivered event"
                    );
                    return StatusCode::OK.into_response();
                }
            }

            let envelope = SlackEnvelope {
                envelope_id: event_id.clone().unwrap_or_else(|| "unknown-event".to_string()),
                event: SlackEvent::from_event_json(event),
            };
            let context = EventContext { correlation_id: envelope.envelope_id.clone() };

            match state.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Queued | HandlerResult::Ignored) => StatusCode::OK.into_response(),
                Err(error) => {
                    // Let Slack's retry through once we can take it.
                    if let Some(event_id) = &event_id {
                        state.recent.forget(event_id).await;
                    }
                    warn!(
                        event_name = "ingress.webhook.dispatch_failed",
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "event callback could not be queued"
                    );
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                }
            }
        }
        other => {
            info!(event_name = "ingress.webhook.ignored", event_type = ?other, "ignoring payload");
            StatusCode::OK.into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
