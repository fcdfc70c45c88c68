//! Slack integration for henry-bot.
//!
//! - **Socket Mode** (`socket`, `transport`) - WebSocket event loop with reconnects
//! - **Events** (`events`) - Envelope parsing and message classification
//! - **Lanes** (`lanes`) - Per user and channel ordering in front of the bot
//! - **Web API** (`api`) - `auth.test`, `chat.postMessage`, `users.info`
//!
//! # Architecture
//!
//! ```text
//! Slack → SocketModeRunner → EventDispatcher → ConversationLanes → Bot
//!                                                                   ↓
//!                                         chat.postMessage ← SlackOutbox
//! ```

pub mod api;
pub mod events;
pub mod lanes;
pub mod socket;
pub mod transport;

pub use api::{ApiError, BotIdentity, SlackApiClient, SlackOutbox};
pub use events::{classify_message, message_dispatcher, EventDispatcher, SlackEnvelope, SlackEvent};
pub use lanes::{ConversationLanes, LaneError, Submission, DEFAULT_IDLE_RELEASE};
pub use socket::{ReconnectPolicy, SocketError, SocketModeRunner, SocketTransport, TransportError};
pub use transport::{parse_frame, Frame, WebSocketTransport};
