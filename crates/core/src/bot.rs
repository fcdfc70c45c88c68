use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::conversation::{ConversationEngine, ResumeOutcome, Utterances};
use crate::flows::{map_reply, FoodSearchFlow, GuessingGameFlow, HouseMapFlow, MapSize};
use crate::lookup::{BusinessSearch, MapImages, UserDirectory};
use crate::message::InboundMessage;
use crate::outbox::Outbox;
use crate::router::{Handler, TriggerTable};

pub const GENERIC_GREETING: &str = "Hello there!";

/// Shared lookup clients handed to every flow.
#[derive(Clone)]
pub struct Services {
    pub search: Arc<dyn BusinessSearch>,
    pub maps: Arc<dyn MapImages>,
    pub directory: Arc<dyn UserDirectory>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    pub result_limit: u32,
    pub map_size: MapSize,
    pub home_address: String,
    pub idle_timeout: Option<Duration>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            result_limit: config.search.result_limit,
            map_size: MapSize { width: config.maps.width, height: config.maps.height },
            home_address: config.conversation.home_address.clone(),
            idle_timeout: config.conversation.idle_timeout(),
        }
    }
}

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Resumed(ResumeOutcome),
    Routed { trigger: String },
    Ignored,
}

pub struct Bot {
    triggers: TriggerTable,
    engine: ConversationEngine,
    services: Services,
    settings: BotSettings,
}

impl Bot {
    pub fn new(services: Services, settings: BotSettings) -> Self {
        Self::with_triggers(TriggerTable::default_table(), services, settings)
    }

    pub fn with_triggers(triggers: TriggerTable, services: Services, settings: BotSettings) -> Self {
        let mut engine = ConversationEngine::new(Utterances::default(), settings.idle_timeout);
        engine.register(FoodSearchFlow::new(services.search.clone(), settings.result_limit));
        engine.register(GuessingGameFlow::new());
        engine.register(HouseMapFlow::new(services.maps.clone(), settings.map_size));

        Self { triggers, engine, services, settings }
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Open sessions get the message first; otherwise the trigger table decides.
    pub async fn handle(&self, message: &InboundMessage, outbox: &dyn Outbox) -> Dispatch {
        let outcome = self.engine.resume(message, outbox).await;
        if outcome.consumed() {
            debug!(
                event_name = "bot.resumed",
                user_id = %message.user_id,
                channel_id = %message.channel_id,
                outcome = ?outcome,
                "message continued an open conversation"
            );
            return Dispatch::Resumed(outcome);
        }

        let Some(route) = self.triggers.route(message) else {
            debug!(
                event_name = "bot.ignored",
                user_id = %message.user_id,
                context = message.context.as_str(),
                "no trigger matched"
            );
            return Dispatch::Ignored;
        };

        info!(
            event_name = "bot.routed",
            trigger = route.trigger,
            user_id = %message.user_id,
            channel_id = %message.channel_id,
            context = message.context.as_str(),
            "trigger matched"
        );

        match route.handler {
            Handler::Greet => {
                let greeting = self.greeting(&message.user_id).await;
                outbox.say(message, greeting.into()).await;
            }
            Handler::Conversation(kind) => {
                if let Err(start_error) = self.engine.start(*kind, message, outbox).await {
                    error!(
                        event_name = "bot.flow_missing",
                        error = %start_error,
                        "trigger points at an unregistered flow"
                    );
                }
            }
            Handler::HomeAddress => {
                let reply = map_reply(
                    self.services.maps.as_ref(),
                    &self.settings.home_address,
                    self.settings.map_size,
                )
                .await;
                outbox.say(message, reply).await;
            }
            Handler::Reply(text) => outbox.say(message, text.as_str().into()).await,
        }

        Dispatch::Routed { trigger: route.trigger.to_string() }
    }

    async fn greeting(&self, user_id: &str) -> String {
        match self.services.directory.first_name(user_id).await {
            Ok(Some(name)) if !name.trim().is_empty() => format!("Hello, {}!", name.trim()),
            Ok(_) => GENERIC_GREETING.to_string(),
            Err(lookup_error) => {
                warn!(
                    event_name = "lookup.user_failed",
                    user_id = %user_id,
                    error = %lookup_error,
                    "could not resolve user name for greeting"
                );
                GENERIC_GREETING.to_string()
            }
        }
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        self.engine.sweep_expired(now).await
    }
}
