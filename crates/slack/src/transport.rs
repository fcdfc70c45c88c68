//! Socket Mode over a real WebSocket.
//!
//! Slack hands out a single-use `wss://` URL from `apps.connections.open`.
//! Frames arrive as JSON text; anything carrying an `envelope_id` must be
//! acknowledged by echoing the id back on the same socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::api::SlackApiClient;
use crate::events::{SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What one Socket Mode text frame means to the runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Ignored,
}

pub fn parse_frame(text: &str) -> Result<Frame, TransportError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|error| TransportError::Receive(format!("malformed frame: {error}")))?;
    let frame_type = frame.get("type").and_then(Value::as_str).unwrap_or_default();

    match frame_type {
        "hello" => return Ok(Frame::Hello),
        "disconnect" => {
            let reason =
                frame.get("reason").and_then(Value::as_str).unwrap_or("unspecified").to_string();
            return Ok(Frame::Disconnect { reason });
        }
        _ => {}
    }

    let Some(envelope_id) = frame.get("envelope_id").and_then(Value::as_str) else {
        return Ok(Frame::Ignored);
    };

    let event = match (frame_type, frame.pointer("/payload/event")) {
        ("events_api", Some(event)) => SlackEvent::from_event_json(event),
        _ => SlackEvent::Unsupported { event_type: frame_type.to_string() },
    };

    Ok(Frame::Envelope(SlackEnvelope { envelope_id: envelope_id.to_string(), event }))
}

pub struct WebSocketTransport {
    api: SlackApiClient,
    socket: Mutex<Option<Socket>>,
}

impl WebSocketTransport {
    pub fn new(api: SlackApiClient) -> Self {
        Self { api, socket: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .api
            .open_connection()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (socket, _response) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.socket.lock().await = Some(socket);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.socket.lock().await;
        let socket =
            guard.as_mut().ok_or_else(|| TransportError::Receive("not connected".to_string()))?;

        loop {
            let message = match socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Disconnected("socket closed".to_string())),
            };

            match message {
                Message::Text(text) => match parse_frame(&text)? {
                    Frame::Envelope(envelope) => return Ok(Some(envelope)),
                    Frame::Hello => info!("socket mode hello received"),
                    Frame::Disconnect { reason } => {
                        return Err(TransportError::Disconnected(reason));
                    }
                    Frame::Ignored => debug!(frame = %text, "ignoring socket mode frame"),
                },
                Message::Ping(payload) => socket
                    .send(Message::Pong(payload))
                    .await
                    .map_err(|error| TransportError::Receive(error.to_string()))?,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .unwrap_or_else(|| "close frame".to_string());
                    return Err(TransportError::Disconnected(reason));
                }
                _ => {}
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.socket.lock().await;
        let socket = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("not connected".to_string()))?;
        let ack = json!({ "envelope_id": envelope_id }).to_string();

        socket
            .send(Message::Text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut socket) = self.socket.lock().await.take() else {
            return Ok(());
        };
        socket.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
