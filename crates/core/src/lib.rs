pub mod bot;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod flows;
pub mod lookup;
pub mod message;
pub mod outbox;
pub mod router;

pub use bot::{Bot, BotSettings, Dispatch, Services};
pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use conversation::{ConversationEngine, FlowKind, ResumeOutcome};
pub use errors::{BotError, DeliveryError, ErrorKind};
pub use lookup::{
    AnonymousDirectory, Business, BusinessSearch, LookupError, MapImages, MapRequest,
    SearchRequest, SearchResults, UserDirectory,
};
pub use message::{Attachment, InboundMessage, MessageContext, OutboundReply, SessionKey};
pub use outbox::{Outbox, RecordingOutbox};
pub use router::{Handler, Route, Trigger, TriggerTable};
