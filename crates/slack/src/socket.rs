use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{EventContext, EventDispatcher, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    /// Slack asked us to go away or dropped the socket; a fresh connection is needed.
    #[error("transport disconnected by peer: {0}")]
    Disconnected(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("socket mode gave up after {attempts} consecutive failures: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: TransportError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// A Socket Mode connection. `next_envelope` yields `Ok(None)` only when the
/// stream has ended for good; peer disconnects surface as errors.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Pumps envelopes until the transport ends. Consecutive failures are
    /// retried with backoff and the counter resets after every good connect.
    /// A peer disconnect on a live socket reconnects at once.
    pub async fn start(&self) -> Result<(), SocketError> {
        let mut failures: u32 = 0;

        loop {
            let failure = match self.connect_and_pump(failures).await {
                Ok(()) => return Ok(()),
                Err((TransportError::Disconnected(reason), true)) => {
                    info!(
                        event_name = "ingress.slack.reconnect_requested",
                        reason = %reason,
                        "socket closed by slack; reconnecting"
                    );
                    failures = 0;
                    continue;
                }
                Err((error, connected)) => {
                    if connected {
                        failures = 0;
                    }
                    error
                }
            };

            warn!(
                event_name = "ingress.slack.transport_failed",
                attempt = failures,
                max_retries = self.reconnect_policy.max_retries,
                error = %failure,
                "socket mode transport failed"
            );

            if failures >= self.reconnect_policy.max_retries {
                error!(
                    event_name = "ingress.slack.retries_exhausted",
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted"
                );
                return Err(SocketError::RetriesExhausted {
                    attempts: failures + 1,
                    last_error: failure,
                });
            }

            let delay = self.reconnect_policy.backoff(failures);
            failures += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// On failure, also reports whether the connection had come up.
    async fn connect_and_pump(&self, attempt: u32) -> Result<(), (TransportError, bool)> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await.map_err(|error| (error, false))?;
        info!(attempt, "socket mode transport connected");

        loop {
            let envelope = match self.transport.next_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    info!(attempt, "socket mode transport stream closed");
                    if let Err(error) = self.transport.disconnect().await {
                        warn!(error = %error, "socket mode disconnect failed");
                    }
                    return Ok(());
                }
                Err(error) => {
                    if let Err(disconnect_error) = self.transport.disconnect().await {
                        debug!(error = %disconnect_error, "ignoring disconnect failure");
                    }
                    return Err((error, true));
                }
            };

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                channel_id = channel_of(&envelope).unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    error = %error,
                    "event dispatch failed; continuing socket loop"
                );
            }
        }
    }
}

fn channel_of(envelope: &SlackEnvelope) -> Option<&str> {
    match &envelope.event {
        SlackEvent::Message(event) => Some(event.channel_id.as_str()),
        SlackEvent::Unsupported { .. } => None,
    }
}
