use async_trait::async_trait;
use tracing::{info, warn};

use crate::conversation::{
    Ask, ConversationFlow, FlowKind, GameState, Next, Pattern, Reply, Step, Turn,
};
use crate::message::{Attachment, OutboundReply, ACCENT_COLOR};

pub const CONFIRM_PROMPT: &str = "Would you like to play a game?";
pub const FIRST_GUESS_PROMPT: &str = "Guess my favorite color.";
pub const RETRY_PROMPT: &str = "Guess again!";
pub const HINT_PROMPT: &str = "Guess again! Hint: It rhymes with \"shoe\"";
pub const DECLINED: &str = "Okay! Don't get too bored!";
pub const FIRST_TRY_WIN: &str =
    "You won on the first try! Either you're very smart, or you looked at my code ;)";
pub const RETRY_WIN: &str = "You win! Thanks for playing with me :-)";
pub const TROPHY_IMAGE_URL: &str =
    "https://pixabay.com/static/uploads/photo/2013/07/12/18/29/trophy-153395_960_720.png";
pub const TARGET_COLOR: &str = "blue";

/// Misses tolerated before the rhyming hint shows up.
const PLAIN_RETRIES: u32 = 2;

#[derive(Clone, Debug, Default)]
pub struct GuessingGameFlow;

impl GuessingGameFlow {
    pub fn new() -> Self {
        Self
    }
}

pub fn is_correct_guess(reply: &str) -> bool {
    reply.trim().to_lowercase() == TARGET_COLOR
}

/// Prompt shown after `misses` wrong guesses.
pub fn retry_prompt(misses: u32) -> &'static str {
    if misses > PLAIN_RETRIES {
        HINT_PROMPT
    } else {
        RETRY_PROMPT
    }
}

fn trophy_reply() -> OutboundReply {
    OutboundReply::rich(
        RETRY_WIN,
        Attachment::new()
            .fallback("Cool pic of a trophy")
            .image_url(TROPHY_IMAGE_URL)
            .color(ACCENT_COLOR),
    )
}

#[async_trait]
impl ConversationFlow for GuessingGameFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::GuessingGame
    }

    async fn start(&self, _turn: &Turn<'_>) -> Next {
        Next::Ask(Ask::yes_no(Step::ConfirmGame, CONFIRM_PROMPT))
    }

    async fn resume(&self, step: Step, reply: Reply<'_>, turn: &Turn<'_>) -> Next {
        match step {
            Step::ConfirmGame if reply.matched == Some(Pattern::Affirmative) => Next::Ask(
                Ask::free(Step::GuessColor(GameState::default()), FIRST_GUESS_PROMPT),
            ),
            Step::ConfirmGame => {
                turn.say(DECLINED).await;
                Next::Finish
            }
            Step::GuessColor(state) if is_correct_guess(reply.text) => {
                info!(event_name = "game.won", misses = state.misses, "guessing game won");
                if state.misses == 0 {
                    turn.say(FIRST_TRY_WIN).await;
                } else {
                    turn.say(trophy_reply()).await;
                }
                Next::Finish
            }
            Step::GuessColor(state) => {
                let misses = state.misses.saturating_add(1);
                Next::Ask(Ask::free(Step::GuessColor(GameState { misses }), retry_prompt(misses)))
            }
            other => {
                warn!(step = ?other, "guessing game flow received a foreign step");
                Next::Finish
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_correct_guess, retry_prompt, GuessingGameFlow, CONFIRM_PROMPT, DECLINED,
        FIRST_GUESS_PROMPT, FIRST_TRY_WIN, HINT_PROMPT, RETRY_PROMPT, RETRY_WIN,
        TROPHY_IMAGE_URL,
    };
    use crate::conversation::{ConversationEngine, FlowKind, GameState, ResumeOutcome, Step};
    use crate::message::{InboundMessage, MessageContext};
    use crate::outbox::RecordingOutbox;

    fn message(user: &str, text: &str) -> InboundMessage {
        InboundMessage::new(user, "C1", MessageContext::DirectMention, text)
    }

    async fn started(user: &str) -> (ConversationEngine, RecordingOutbox) {
        let mut engine = ConversationEngine::default();
        engine.register(GuessingGameFlow::new());
        let outbox = RecordingOutbox::new();
        engine.start(FlowKind::GuessingGame, &message(user, "game"), &outbox).await.expect("start");
        engine.resume(&message(user, "yes"), &outbox).await;
        (engine, outbox)
    }

    #[test]
    fn guesses_are_normalized() {
        assert!(is_correct_guess("Blue"));
        assert!(is_correct_guess("  BLUE \n"));
        assert!(!is_correct_guess("blue-ish"));
    }

    #[test]
    fn hint_starts_with_third_miss() {
        assert_eq!(retry_prompt(1), RETRY_PROMPT);
        assert_eq!(retry_prompt(2), RETRY_PROMPT);
        assert_eq!(retry_prompt(3), HINT_PROMPT);
        assert_eq!(retry_prompt(40), HINT_PROMPT);
    }

    #[tokio::test]
    async fn first_try_win_in_any_casing() {
        let (engine, outbox) = started("U1").await;

        let outcome = engine.resume(&message("U1", "bLuE"), &outbox).await;

        assert_eq!(outcome, ResumeOutcome::Finished);
        assert_eq!(outbox.texts().await, vec![CONFIRM_PROMPT, FIRST_GUESS_PROMPT, FIRST_TRY_WIN]);
    }

    #[tokio::test]
    async fn two_misses_then_win_gives_two_plain_retries_and_trophy() {
        let (engine, outbox) = started("U1").await;

        for guess in ["red", "green", "blue"] {
            engine.resume(&message("U1", guess), &outbox).await;
        }

        let replies = outbox.replies().await;
        let texts: Vec<&str> = replies.iter().map(|reply| reply.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![CONFIRM_PROMPT, FIRST_GUESS_PROMPT, RETRY_PROMPT, RETRY_PROMPT, RETRY_WIN]
        );
        assert_eq!(
            replies[4].attachments[0].image_url.as_deref(),
            Some(TROPHY_IMAGE_URL)
        );
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn third_miss_switches_to_hint_and_keeps_counting() {
        let (engine, outbox) = started("U1").await;

        for guess in ["red", "green", "yellow", "pink"] {
            engine.resume(&message("U1", guess), &outbox).await;
        }

        let texts = outbox.texts().await;
        assert_eq!(&texts[2..], &[RETRY_PROMPT, RETRY_PROMPT, HINT_PROMPT, HINT_PROMPT]);
        let pending = engine
            .pending_ask(&message("U1", "").session_key())
            .await
            .expect("still guessing");
        assert_eq!(pending.step, Step::GuessColor(GameState { misses: 4 }));
    }

    #[tokio::test]
    async fn concurrent_games_keep_separate_counters() {
        let mut engine = ConversationEngine::default();
        engine.register(GuessingGameFlow::new());
        let outbox = RecordingOutbox::new();
        for user in ["U1", "U2"] {
            engine.start(FlowKind::GuessingGame, &message(user, "game"), &outbox).await.expect("start");
            engine.resume(&message(user, "yes"), &outbox).await;
        }

        for guess in ["red", "green", "teal"] {
            engine.resume(&message("U1", guess), &outbox).await;
        }
        engine.resume(&message("U2", "red"), &outbox).await;

        let u1 = engine.pending_ask(&message("U1", "").session_key()).await.expect("u1");
        let u2 = engine.pending_ask(&message("U2", "").session_key()).await.expect("u2");
        assert_eq!(u1.step, Step::GuessColor(GameState { misses: 3 }));
        assert_eq!(u2.step, Step::GuessColor(GameState { misses: 1 }));
    }

    #[tokio::test]
    async fn new_game_resets_miss_counter() {
        let (engine, outbox) = started("U1").await;
        engine.resume(&message("U1", "red"), &outbox).await;
        engine.resume(&message("U1", "blue"), &outbox).await;

        engine.start(FlowKind::GuessingGame, &message("U1", "game"), &outbox).await.expect("start");
        engine.resume(&message("U1", "yes"), &outbox).await;
        engine.resume(&message("U1", "blue"), &outbox).await;

        assert_eq!(outbox.texts().await.last().map(String::as_str), Some(FIRST_TRY_WIN));
    }

    #[tokio::test]
    async fn declining_acknowledges() {
        let mut engine = ConversationEngine::default();
        engine.register(GuessingGameFlow::new());
        let outbox = RecordingOutbox::new();
        engine.start(FlowKind::GuessingGame, &message("U1", "game"), &outbox).await.expect("start");

        engine.resume(&message("U1", "Nah"), &outbox).await;

        assert_eq!(outbox.texts().await, vec![CONFIRM_PROMPT, DECLINED]);
        assert_eq!(engine.session_count().await, 0);
    }
}
