use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{OutboundReply, SessionKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    FoodSearch,
    GuessingGame,
    HouseMap,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FoodSearch => "food_search",
            Self::GuessingGame => "guessing_game",
            Self::HouseMap => "house_map",
        }
    }
}

/// Per-game miss counter. Lives inside the session, never shared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub misses: u32,
}

/// Where a flow stands, together with whatever it has collected so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    ConfirmFood,
    AskFoodType,
    AskLocation { food_type: String },
    ConfirmGame,
    GuessColor(GameState),
    ConfirmMap,
    AskAddress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Affirmative,
    Negative,
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchAction {
    Resume,
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub pattern: Pattern,
    pub action: BranchAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "branches", rename_all = "snake_case")]
pub enum Expect {
    /// Any reply moves the flow forward.
    Any,
    /// Branches are tested in order; the first hit wins.
    Branches(Vec<Branch>),
}

/// One prompt awaiting one reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ask {
    pub step: Step,
    pub prompt: OutboundReply,
    pub expect: Expect,
}

impl Ask {
    pub fn free(step: Step, prompt: impl Into<OutboundReply>) -> Self {
        Self { step, prompt: prompt.into(), expect: Expect::Any }
    }

    /// Yes and no resume the flow, anything else repeats the question.
    pub fn yes_no(step: Step, prompt: impl Into<OutboundReply>) -> Self {
        Self {
            step,
            prompt: prompt.into(),
            expect: Expect::Branches(vec![
                Branch { pattern: Pattern::Affirmative, action: BranchAction::Resume },
                Branch { pattern: Pattern::Negative, action: BranchAction::Resume },
                Branch { pattern: Pattern::Default, action: BranchAction::Repeat },
            ]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub key: SessionKey,
    pub flow: FlowKind,
    pub pending: Option<Ask>,
    pub repeats: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(key: SessionKey, flow: FlowKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            flow,
            pending: None,
            repeats: 0,
            started_at: now,
            last_activity_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity_at > timeout
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Ask, ConversationSession, Expect, FlowKind, GameState, Pattern, Step};
    use crate::message::SessionKey;

    fn key() -> SessionKey {
        SessionKey { user_id: "U1".to_owned(), channel_id: "D1".to_owned() }
    }

    #[test]
    fn yes_no_ask_ends_with_repeating_default_branch() {
        let ask = Ask::yes_no(Step::ConfirmGame, "Would you like to play a game?");
        let Expect::Branches(branches) = &ask.expect else {
            panic!("yes/no asks must branch");
        };

        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0].pattern, Pattern::Affirmative);
        assert_eq!(branches[2].pattern, Pattern::Default);
    }

    #[test]
    fn session_round_trips_through_json_with_pending_step() {
        let mut session = ConversationSession::new(key(), FlowKind::GuessingGame, Utc::now());
        session.pending =
            Some(Ask::free(Step::GuessColor(GameState { misses: 3 }), "Guess again!"));

        let json = serde_json::to_string(&session).expect("serialize session");
        let restored: super::ConversationSession =
            serde_json::from_str(&json).expect("deserialize session");

        assert_eq!(restored, session);
        assert!(json.contains("\"step\":\"guess_color\""));
    }

    #[test]
    fn idleness_is_measured_from_last_activity() {
        let start = Utc::now();
        let mut session = ConversationSession::new(key(), FlowKind::FoodSearch, start);
        session.touch(start + Duration::minutes(10));

        assert!(!session.is_idle(start + Duration::minutes(20), Duration::minutes(15)));
        assert!(session.is_idle(start + Duration::minutes(26), Duration::minutes(15)));
    }
}
