//! Per-(user, channel) processing lanes.
//!
//! Every conversation key gets its own task fed by an unbounded queue, so
//! messages from one user in one channel are handled strictly in arrival
//! order while different users proceed concurrently. A lane whose queue stays
//! empty for the idle release period is closed and forgotten; the next
//! message for that key opens a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use henry_core::message::{InboundMessage, MessageContext, SessionKey};
use henry_core::{Bot, Outbox};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_IDLE_RELEASE: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaneError {
    #[error("conversation lanes are shut down")]
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// Channel chatter from a user with nothing in progress.
    Skipped,
}

struct Lane {
    sender: mpsc::UnboundedSender<InboundMessage>,
    task: JoinHandle<()>,
}

type LaneMap = Arc<Mutex<Option<HashMap<SessionKey, Lane>>>>;

pub struct ConversationLanes {
    bot: Arc<Bot>,
    outbox: Arc<dyn Outbox>,
    lanes: LaneMap,
    idle_release: Duration,
}

impl ConversationLanes {
    pub fn new(bot: Arc<Bot>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            bot,
            outbox,
            lanes: Arc::new(Mutex::new(Some(HashMap::new()))),
            idle_release: DEFAULT_IDLE_RELEASE,
        }
    }

    pub fn with_idle_release(mut self, idle_release: Duration) -> Self {
        self.idle_release = idle_release;
        self
    }

    pub async fn submit(&self, message: InboundMessage) -> Result<Submission, LaneError> {
        let mut guard = self.lanes.lock().await;
        let lanes = guard.as_mut().ok_or(LaneError::Closed)?;
        let key = message.session_key();

        let message = match lanes.get(&key) {
            Some(lane) => match lane.sender.send(message) {
                Ok(()) => return Ok(Submission::Queued),
                // The lane task died; start a fresh one below.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        if message.context == MessageContext::Ambient
            && !self.bot.engine().has_session(&key).await
        {
            lanes.remove(&key);
            return Ok(Submission::Skipped);
        }

        let lane = self.spawn_lane(&key);
        if lane.sender.send(message).is_err() {
            warn!(event_name = "lanes.send_failed", user_id = %key.user_id, "new lane closed early");
        }
        lanes.insert(key, lane);
        Ok(Submission::Queued)
    }

    fn spawn_lane(&self, key: &SessionKey) -> Lane {
        let (sender, receiver) = mpsc::unbounded_channel::<InboundMessage>();
        debug!(
            event_name = "lanes.opened",
            user_id = %key.user_id,
            channel_id = %key.channel_id,
            "opening conversation lane"
        );

        let task = tokio::spawn(run_lane(
            key.clone(),
            receiver,
            self.bot.clone(),
            self.outbox.clone(),
            self.lanes.clone(),
            self.idle_release,
        ));
        Lane { sender, task }
    }

    pub async fn lane_count(&self) -> usize {
        self.lanes.lock().await.as_ref().map_or(0, HashMap::len)
    }

    /// Stops accepting messages and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        let Some(lanes) = self.lanes.lock().await.take() else {
            return;
        };

        for (key, lane) in lanes {
            drop(lane.sender);
            if let Err(error) = lane.task.await {
                warn!(
                    event_name = "lanes.task_failed",
                    user_id = %key.user_id,
                    channel_id = %key.channel_id,
                    error = %error,
                    "conversation lane ended abnormally"
                );
            }
        }
    }
}

async fn run_lane(
    key: SessionKey,
    mut receiver: mpsc::UnboundedReceiver<InboundMessage>,
    bot: Arc<Bot>,
    outbox: Arc<dyn Outbox>,
    lanes: LaneMap,
    idle_release: Duration,
) {
    loop {
        match tokio::time::timeout(idle_release, receiver.recv()).await {
            Ok(Some(message)) => {
                bot.handle(&message, outbox.as_ref()).await;
            }
            Ok(None) => return,
            Err(_) => {
                // Senders only push while holding the map lock, so an empty
                // queue seen under the lock stays empty once the entry is gone.
                let mut guard = lanes.lock().await;
                match receiver.try_recv() {
                    Ok(message) => {
                        drop(guard);
                        bot.handle(&message, outbox.as_ref()).await;
                    }
                    Err(_) => {
                        if let Some(map) = guard.as_mut() {
                            map.remove(&key);
                        }
                        debug!(
                            event_name = "lanes.released",
                            user_id = %key.user_id,
                            channel_id = %key.channel_id,
                            "released idle conversation lane"
                        );
                        return;
                    }
                }
            }
        }
    }
}
