use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::conversation::{Ask, ConversationFlow, FlowKind, Next, Pattern, Reply, Step, Turn};
use crate::errors::BotError;
use crate::lookup::{MapImages, MapRequest};
use crate::message::{Attachment, OutboundReply};

pub const CONFIRM_PROMPT: &str = "Would you like to see a map of a house?";
pub const ADDRESS_PROMPT: &str = "What address should I look up?";
pub const DECLINED: &str = "Okay! Maybe another time.";
pub const MAP_FAILED: &str = "Uh oh! I could not load a map right now...";
pub const HOME_ADDRESS: &str = "1 Infinite Loop, Cupertino, CA";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapSize {
    pub width: u32,
    pub height: u32,
}

impl Default for MapSize {
    fn default() -> Self {
        Self { width: 600, height: 300 }
    }
}

/// Looks up a static map for `address` and renders the reply. The apology
/// keeps `address` as its caption.
pub async fn map_reply(maps: &dyn MapImages, address: &str, size: MapSize) -> OutboundReply {
    let request =
        MapRequest { location: address.to_owned(), width: size.width, height: size.height };
    match maps.image_url(&request).await {
        Ok(image_url) => OutboundReply::rich(
            "",
            Attachment::new()
                .title(address)
                .image_url(image_url)
                .fallback(format!("Map of {address}")),
        ),
        Err(error) => {
            let error = BotError::from(error);
            warn!(
                event_name = "lookup.map_failed",
                error_kind = ?error.kind(),
                location = %address,
                error = %error,
                "map lookup failed"
            );
            OutboundReply::rich(
                MAP_FAILED,
                Attachment::new().title(address).fallback(format!("Map of {address}")),
            )
        }
    }
}

pub struct HouseMapFlow {
    maps: Arc<dyn MapImages>,
    size: MapSize,
}

impl HouseMapFlow {
    pub fn new(maps: Arc<dyn MapImages>, size: MapSize) -> Self {
        Self { maps, size }
    }
}

#[async_trait]
impl ConversationFlow for HouseMapFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::HouseMap
    }

    async fn start(&self, _turn: &Turn<'_>) -> Next {
        Next::Ask(Ask::yes_no(Step::ConfirmMap, CONFIRM_PROMPT))
    }

    async fn resume(&self, step: Step, reply: Reply<'_>, turn: &Turn<'_>) -> Next {
        match step {
            Step::ConfirmMap if reply.matched == Some(Pattern::Affirmative) => {
                Next::Ask(Ask::free(Step::AskAddress, ADDRESS_PROMPT))
            }
            Step::ConfirmMap => {
                turn.say(DECLINED).await;
                Next::Finish
            }
            Step::AskAddress => {
                turn.say(map_reply(self.maps.as_ref(), reply.text.trim(), self.size).await).await;
                Next::Finish
            }
            other => {
                warn!(step = ?other, "house map flow received a foreign step");
                Next::Finish
            }
        }
    }
}
