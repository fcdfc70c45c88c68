//! Ordered trigger table that maps inbound text to a handler.
//!
//! Triggers are tested in table order and the first one whose phrase appears
//! in the message wins. A phrase matches when its words occur contiguously in
//! the lower-cased message, so `hi` matches "hi there" but not "this". The
//! empty phrase matches every message and is used as the catch-all.

use crate::conversation::FlowKind;
use crate::message::{InboundMessage, MessageContext};

pub const QUESTION_REPLY: &str =
    "That is a great question... I am stumped! Maybe my cousin Siri knows?";
pub const HELP_REPLY: &str = "I can help you find restaurants (type \"food\"), play a game \
     (type \"game\") or show you a map of a house (type \"house\")!";
pub const FALLBACK_REPLY: &str =
    "I am practicing my English! Stop bothering me... But let me know if you are hungry.";

const ADDRESSED: &[MessageContext] =
    &[MessageContext::DirectMessage, MessageContext::DirectMention, MessageContext::Mention];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handler {
    /// Greets the sender by first name.
    Greet,
    Conversation(FlowKind),
    /// Replies with the map of the bot's own address; no session.
    HomeAddress,
    Reply(String),
}

#[derive(Clone, Debug)]
pub struct Trigger {
    pub name: &'static str,
    phrases: Vec<Vec<String>>,
    contexts: Vec<MessageContext>,
    pub handler: Handler,
}

impl Trigger {
    pub fn new(
        name: &'static str,
        phrases: &[&str],
        contexts: &[MessageContext],
        handler: Handler,
    ) -> Self {
        Self {
            name,
            phrases: phrases.iter().map(|phrase| words(phrase)).collect(),
            contexts: contexts.to_vec(),
            handler,
        }
    }

    pub fn applies_to(&self, context: MessageContext) -> bool {
        self.contexts.contains(&context)
    }

    pub fn matches(&self, message_words: &[String]) -> bool {
        self.phrases.iter().any(|phrase| contains_sequence(message_words, phrase))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route<'a> {
    pub trigger: &'a str,
    pub handler: &'a Handler,
}

#[derive(Clone, Debug, Default)]
pub struct TriggerTable {
    triggers: Vec<Trigger>,
}

impl TriggerTable {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }

    pub fn default_table() -> Self {
        Self::new(vec![
            Trigger::new("greeting", &["hey", "hello", "hi", "howdy"], ADDRESSED, Handler::Greet),
            Trigger::new(
                "food",
                &["food", "hungry", "breakfast", "lunch", "dinner"],
                ADDRESSED,
                Handler::Conversation(FlowKind::FoodSearch),
            ),
            Trigger::new(
                "game",
                &["game"],
                ADDRESSED,
                Handler::Conversation(FlowKind::GuessingGame),
            ),
            Trigger::new(
                "house",
                &["house", "address"],
                ADDRESSED,
                Handler::Conversation(FlowKind::HouseMap),
            ),
            Trigger::new("home", &["where do you live"], ADDRESSED, Handler::HomeAddress),
            Trigger::new(
                "question",
                &["what", "where", "why", "how"],
                ADDRESSED,
                Handler::Reply(QUESTION_REPLY.to_string()),
            ),
            Trigger::new("help", &["help"], ADDRESSED, Handler::Reply(HELP_REPLY.to_string())),
            Trigger::new("fallback", &[""], ADDRESSED, Handler::Reply(FALLBACK_REPLY.to_string())),
        ])
    }

    pub fn push(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// First trigger in table order that accepts the message, if any.
    pub fn route(&self, message: &InboundMessage) -> Option<Route<'_>> {
        let message_words = words(&message.text);
        self.triggers
            .iter()
            .filter(|trigger| trigger.applies_to(message.context))
            .find(|trigger| trigger.matches(&message_words))
            .map(|trigger| Route { trigger: trigger.name, handler: &trigger.handler })
    }
}

pub fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '\''))
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
