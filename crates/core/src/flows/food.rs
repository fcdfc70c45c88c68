use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::conversation::{Ask, ConversationFlow, FlowKind, Next, Pattern, Reply, Step, Turn};
use crate::errors::BotError;
use crate::lookup::{Business, BusinessSearch, SearchRequest};
use crate::message::{Attachment, OutboundReply, ACCENT_COLOR};

pub const CONFIRM_PROMPT: &str = "Would you like food recommendations nearby?";
pub const FOOD_TYPE_PROMPT: &str = "What kind of food are you in the mood for?";
pub const LOCATION_PROMPT: &str = "Where are you?";
pub const DECLINED: &str = "Okay! Don't go hungry!";
pub const NO_RESULTS: &str = "I did not find any results :(";
pub const SEARCH_FAILED: &str = "Uh oh! I could not connect to Yelp...";
pub const DEFAULT_RESULT_LIMIT: u32 = 2;

pub struct FoodSearchFlow {
    search: Arc<dyn BusinessSearch>,
    result_limit: u32,
}

impl FoodSearchFlow {
    pub fn new(search: Arc<dyn BusinessSearch>, result_limit: u32) -> Self {
        Self { search, result_limit }
    }

    async fn find_food(&self, food_type: String, location: &str, turn: &Turn<'_>) -> Next {
        turn.say(format!("Looking for {food_type} in {location}...")).await;

        let request =
            SearchRequest { term: food_type, location: location.to_owned(), limit: self.result_limit };
        match self.search.search(&request).await {
            Ok(results) => {
                info!(
                    event_name = "lookup.search_completed",
                    total = results.total,
                    returned = results.businesses.len(),
                    "business search completed"
                );
                if results.total < 1 {
                    turn.say(NO_RESULTS).await;
                } else {
                    for business in &results.businesses {
                        turn.say(business_reply(business)).await;
                    }
                }
            }
            Err(error) => {
                let error = BotError::from(error);
                warn!(
                    event_name = "lookup.search_failed",
                    error_kind = ?error.kind(),
                    term = %request.term,
                    location = %request.location,
                    error = %error,
                    "business search failed"
                );
                turn.say(SEARCH_FAILED).await;
            }
        }
        Next::Finish
    }
}

pub fn business_reply(business: &Business) -> OutboundReply {
    let mut attachment = Attachment::new()
        .fallback(business.snippet_text.clone())
        .title(business.name.clone())
        .title_link(business.url.clone())
        .text(business.snippet_text.clone())
        .color(ACCENT_COLOR);
    if let Some(image_url) = &business.image_url {
        attachment = attachment.image_url(image_url.clone());
    }
    OutboundReply::rich(format!("rating: {}", business.rating), attachment)
}

#[async_trait]
impl ConversationFlow for FoodSearchFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::FoodSearch
    }

    async fn start(&self, _turn: &Turn<'_>) -> Next {
        Next::Ask(Ask::yes_no(Step::ConfirmFood, CONFIRM_PROMPT))
    }

    async fn resume(&self, step: Step, reply: Reply<'_>, turn: &Turn<'_>) -> Next {
        match step {
            Step::ConfirmFood if reply.matched == Some(Pattern::Affirmative) => {
                Next::Ask(Ask::free(Step::AskFoodType, FOOD_TYPE_PROMPT))
            }
            Step::ConfirmFood => {
                turn.say(DECLINED).await;
                Next::Finish
            }
            Step::AskFoodType => Next::Ask(Ask::free(
                Step::AskLocation { food_type: reply.text.trim().to_owned() },
                LOCATION_PROMPT,
            )),
            Step::AskLocation { food_type } => {
                self.find_food(food_type, reply.text.trim(), turn).await
            }
            other => {
                warn!(step = ?other, "food search flow received a foreign step");
                Next::Finish
            }
        }
    }
}
