use std::sync::Arc;

use henry_core::config::{AppConfig, ConfigError};
use henry_core::{Bot, BotError, BotSettings, LookupError, Services};
use henry_lookup::{StaticMapClient, YelpClient};
use henry_slack::{
    message_dispatcher, ApiError, BotIdentity, ConversationLanes, EventDispatcher,
    ReconnectPolicy, SlackApiClient, SlackOutbox, SocketModeRunner, WebSocketTransport,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub identity: BotIdentity,
    pub bot: Arc<Bot>,
    pub lanes: Arc<ConversationLanes>,
    /// Feeds webhook deliveries into the same lanes as the socket.
    pub webhook_dispatcher: Arc<EventDispatcher>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("lookup client could not be built: {0}")]
    Lookup(#[from] LookupError),
    #[error("slack client could not be built: {0}")]
    SlackClient(#[source] ApiError),
    #[error("slack rejected the bot token: {0}")]
    SlackAuth(#[source] ApiError),
}

/// Anything that stops bootstrap is a startup failure.
impl From<BootstrapError> for BotError {
    fn from(error: BootstrapError) -> Self {
        match error {
            BootstrapError::Config(error) => BotError::Config(error),
            other => BotError::startup(other),
        }
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let slack = SlackApiClient::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
        config.slack.app_token.clone(),
    )
    .map_err(BootstrapError::SlackClient)?;

    let identity = slack.auth_test().await.map_err(BootstrapError::SlackAuth)?;
    info!(
        event_name = "system.bootstrap.slack_authenticated",
        correlation_id = "bootstrap",
        bot_user_id = %identity.user_id,
        team = identity.team.as_deref().unwrap_or("unknown"),
        "slack bot token verified"
    );

    let services = Services {
        search: Arc::new(YelpClient::from_config(&config.search)?),
        maps: Arc::new(StaticMapClient::from_config(&config.maps)),
        directory: Arc::new(slack.clone()),
    };
    let bot = Arc::new(Bot::new(services, BotSettings::from_config(&config)));
    let outbox = Arc::new(SlackOutbox::new(slack.clone()));
    let lanes = Arc::new(ConversationLanes::new(bot.clone(), outbox));

    let slack_runner = SocketModeRunner::new(
        Arc::new(WebSocketTransport::new(slack)),
        message_dispatcher(lanes.clone(), &identity.user_id),
        ReconnectPolicy::default(),
    );
    let webhook_dispatcher = Arc::new(message_dispatcher(lanes.clone(), &identity.user_id));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        flows = bot.engine().flow_count(),
        "bot wired to slack transport"
    );

    Ok(Application { config, identity, bot, lanes, webhook_dispatcher, slack_runner })
}
