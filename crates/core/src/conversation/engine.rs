use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::conversation::session::{
    Ask, BranchAction, ConversationSession, Expect, FlowKind, Pattern, Step,
};
use crate::conversation::utterances::{Answer, Utterances};
use crate::message::{InboundMessage, OutboundReply, SessionKey};
use crate::outbox::Outbox;

/// The message being handled plus the place its replies go.
pub struct Turn<'a> {
    pub origin: &'a InboundMessage,
    outbox: &'a dyn Outbox,
}

impl<'a> Turn<'a> {
    pub fn new(origin: &'a InboundMessage, outbox: &'a dyn Outbox) -> Self {
        Self { origin, outbox }
    }

    pub async fn say(&self, reply: impl Into<OutboundReply>) {
        self.outbox.say(self.origin, reply.into()).await;
    }
}

/// A classified reply as seen by a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reply<'a> {
    pub text: &'a str,
    /// The branch pattern that matched, or `None` for an unconditional ask.
    pub matched: Option<Pattern>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    Ask(Ask),
    Finish,
}

#[async_trait]
pub trait ConversationFlow: Send + Sync {
    fn kind(&self) -> FlowKind;
    async fn start(&self, turn: &Turn<'_>) -> Next;
    async fn resume(&self, step: Step, reply: Reply<'_>, turn: &Turn<'_>) -> Next;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("no conversation flow registered for `{}`", .0.as_str())]
    UnknownFlow(FlowKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No session for this user and channel; the message should be routed.
    NoSession,
    /// A session existed but sat idle past the timeout and was discarded.
    Expired,
    Advanced,
    Repeated,
    Finished,
    /// No branch accepted the reply; the question stays pending, nothing is said.
    Unmatched,
}

impl ResumeOutcome {
    pub fn consumed(&self) -> bool {
        !matches!(self, Self::NoSession | Self::Expired)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Resume(Option<Pattern>),
    Repeat,
    Unmatched,
}

pub fn classify(expect: &Expect, text: &str, utterances: &Utterances) -> Classification {
    let branches = match expect {
        Expect::Any => return Classification::Resume(None),
        Expect::Branches(branches) => branches,
    };

    let answer = utterances.classify(text);
    for branch in branches {
        let hit = match branch.pattern {
            Pattern::Affirmative => answer == Some(Answer::Yes),
            Pattern::Negative => answer == Some(Answer::No),
            Pattern::Default => true,
        };
        if hit {
            return match branch.action {
                BranchAction::Resume => Classification::Resume(Some(branch.pattern)),
                BranchAction::Repeat => Classification::Repeat,
            };
        }
    }

    Classification::Unmatched
}

pub struct ConversationEngine {
    flows: HashMap<FlowKind, Arc<dyn ConversationFlow>>,
    sessions: Mutex<HashMap<SessionKey, ConversationSession>>,
    utterances: Utterances,
    idle_timeout: Option<Duration>,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new(Utterances::default(), None)
    }
}

impl ConversationEngine {
    /// `idle_timeout` of `None` keeps abandoned sessions forever.
    pub fn new(utterances: Utterances, idle_timeout: Option<std::time::Duration>) -> Self {
        Self {
            flows: HashMap::new(),
            sessions: Mutex::new(HashMap::new()),
            utterances,
            idle_timeout: idle_timeout.and_then(|timeout| Duration::from_std(timeout).ok()),
        }
    }

    pub fn register<F>(&mut self, flow: F)
    where
        F: ConversationFlow + 'static,
    {
        self.flows.insert(flow.kind(), Arc::new(flow));
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    fn flow(&self, kind: FlowKind) -> Result<Arc<dyn ConversationFlow>, ConversationError> {
        self.flows.get(&kind).cloned().ok_or(ConversationError::UnknownFlow(kind))
    }

    pub async fn start(
        &self,
        kind: FlowKind,
        origin: &InboundMessage,
        outbox: &dyn Outbox,
    ) -> Result<SessionStatus, ConversationError> {
        let flow = self.flow(kind)?;
        let session = ConversationSession::new(origin.session_key(), kind, Utc::now());

        if self.sessions.lock().await.remove(&session.key).is_some() {
            warn!(
                event_name = "conversation.replaced",
                user_id = %origin.user_id,
                channel_id = %origin.channel_id,
                "starting a conversation over an open session"
            );
        }
        info!(
            event_name = "conversation.started",
            session_id = %session.id,
            flow = kind.as_str(),
            user_id = %origin.user_id,
            channel_id = %origin.channel_id,
            "conversation started"
        );

        let turn = Turn::new(origin, outbox);
        let next = flow.start(&turn).await;
        Ok(self.settle(session, next, &turn).await)
    }

    pub async fn resume(&self, origin: &InboundMessage, outbox: &dyn Outbox) -> ResumeOutcome {
        let key = origin.session_key();
        let Some(mut session) = self.sessions.lock().await.remove(&key) else {
            return ResumeOutcome::NoSession;
        };

        let now = Utc::now();
        if self.is_expired(&session, now) {
            info!(
                event_name = "conversation.expired",
                session_id = %session.id,
                flow = session.flow.as_str(),
                user_id = %key.user_id,
                channel_id = %key.channel_id,
                "discarding idle conversation"
            );
            return ResumeOutcome::Expired;
        }

        let (Some(ask), Ok(flow)) = (session.pending.take(), self.flow(session.flow)) else {
            warn!(
                event_name = "conversation.corrupt",
                session_id = %session.id,
                "session had no pending ask or unknown flow; dropping it"
            );
            return ResumeOutcome::NoSession;
        };

        let turn = Turn::new(origin, outbox);
        match classify(&ask.expect, &origin.text, &self.utterances) {
            Classification::Repeat => {
                session.repeats += 1;
                debug!(
                    event_name = "conversation.repeated",
                    session_id = %session.id,
                    repeats = session.repeats,
                    "reply not recognized; repeating question"
                );
                turn.say(ask.prompt.clone()).await;
                self.park(session, ask, now).await;
                ResumeOutcome::Repeated
            }
            Classification::Unmatched => {
                self.park(session, ask, now).await;
                ResumeOutcome::Unmatched
            }
            Classification::Resume(matched) => {
                let next =
                    flow.resume(ask.step, Reply { text: &origin.text, matched }, &turn).await;
                match self.settle(session, next, &turn).await {
                    SessionStatus::Open => ResumeOutcome::Advanced,
                    SessionStatus::Finished => ResumeOutcome::Finished,
                }
            }
        }
    }

    async fn settle(
        &self,
        session: ConversationSession,
        next: Next,
        turn: &Turn<'_>,
    ) -> SessionStatus {
        match next {
            Next::Ask(ask) => {
                turn.say(ask.prompt.clone()).await;
                self.park(session, ask, Utc::now()).await;
                SessionStatus::Open
            }
            Next::Finish => {
                info!(
                    event_name = "conversation.finished",
                    session_id = %session.id,
                    flow = session.flow.as_str(),
                    repeats = session.repeats,
                    "conversation finished"
                );
                SessionStatus::Finished
            }
        }
    }

    async fn park(&self, mut session: ConversationSession, ask: Ask, now: DateTime<Utc>) {
        session.pending = Some(ask);
        session.touch(now);
        self.sessions.lock().await.insert(session.key.clone(), session);
    }

    fn is_expired(&self, session: &ConversationSession, now: DateTime<Utc>) -> bool {
        self.idle_timeout.is_some_and(|timeout| session.is_idle(now, timeout))
    }

    /// Drops every session idle past the timeout; returns how many were dropped.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        let swept = before - sessions.len();
        if swept > 0 {
            info!(event_name = "conversation.swept", swept, "discarded idle conversations");
        }
        swept
    }

    pub async fn has_session(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    pub async fn pending_ask(&self, key: &SessionKey) -> Option<Ask> {
        self.sessions.lock().await.get(key).and_then(|session| session.pending.clone())
    }

    pub async fn snapshot(&self, key: &SessionKey) -> Option<ConversationSession> {
        self.sessions.lock().await.get(key).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use super::{
        classify, Classification, ConversationEngine, ConversationError, ConversationFlow, Next,
        Reply, ResumeOutcome, SessionStatus, Turn,
    };
    use crate::conversation::session::{
        Ask, Branch, BranchAction, Expect, FlowKind, Pattern, Step,
    };
    use crate::conversation::utterances::Utterances;
    use crate::message::{InboundMessage, MessageContext};
    use crate::outbox::RecordingOutbox;

    /// Two-question flow: confirm, then any answer finishes.
    struct ScriptedFlow;

    #[async_trait]
    impl ConversationFlow for ScriptedFlow {
        fn kind(&self) -> FlowKind {
            FlowKind::FoodSearch
        }

        async fn start(&self, _turn: &Turn<'_>) -> Next {
            Next::Ask(Ask::yes_no(Step::ConfirmFood, "Continue?"))
        }

        async fn resume(&self, step: Step, reply: Reply<'_>, turn: &Turn<'_>) -> Next {
            match (step, reply.matched) {
                (Step::ConfirmFood, Some(Pattern::Affirmative)) => {
                    Next::Ask(Ask::free(Step::AskFoodType, "Say anything."))
                }
                (Step::ConfirmFood, _) => {
                    turn.say("Bye.").await;
                    Next::Finish
                }
                (_, _) => {
                    turn.say(format!("You said {}", reply.text)).await;
                    Next::Finish
                }
            }
        }
    }

    fn engine() -> ConversationEngine {
        let mut engine = ConversationEngine::default();
        engine.register(ScriptedFlow);
        engine
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage::new("U1", "D1", MessageContext::DirectMessage, text)
    }

    #[test]
    fn classify_any_always_resumes() {
        assert_eq!(
            classify(&Expect::Any, "whatever", &Utterances::default()),
            Classification::Resume(None)
        );
    }

    #[test]
    fn classify_picks_first_matching_branch() {
        let ask = Ask::yes_no(Step::ConfirmGame, "Play?");
        let utterances = Utterances::default();

        assert_eq!(
            classify(&ask.expect, "yep", &utterances),
            Classification::Resume(Some(Pattern::Affirmative))
        );
        assert_eq!(
            classify(&ask.expect, "nope", &utterances),
            Classification::Resume(Some(Pattern::Negative))
        );
        assert_eq!(classify(&ask.expect, "purple", &utterances), Classification::Repeat);
    }

    #[test]
    fn classify_without_default_leaves_reply_unmatched() {
        let expect = Expect::Branches(vec![Branch {
            pattern: Pattern::Affirmative,
            action: BranchAction::Resume,
        }]);
        assert_eq!(
            classify(&expect, "no", &Utterances::default()),
            Classification::Unmatched
        );
    }

    #[tokio::test]
    async fn start_emits_prompt_and_parks_one_pending_ask() {
        let engine = engine();
        let outbox = RecordingOutbox::new();
        let origin = message("go");

        let status = engine.start(FlowKind::FoodSearch, &origin, &outbox).await.expect("start");

        assert_eq!(status, SessionStatus::Open);
        assert_eq!(outbox.texts().await, vec!["Continue?"]);
        let pending = engine.pending_ask(&origin.session_key()).await.expect("pending ask");
        assert_eq!(pending.step, Step::ConfirmFood);
    }

    #[tokio::test]
    async fn unknown_flow_is_rejected() {
        let engine = ConversationEngine::default();
        let outbox = RecordingOutbox::new();

        let error = engine
            .start(FlowKind::GuessingGame, &message("game"), &outbox)
            .await
            .expect_err("nothing registered");

        assert_eq!(error, ConversationError::UnknownFlow(FlowKind::GuessingGame));
        assert!(outbox.replies().await.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_reply_repeats_identical_prompt_many_times() {
        let engine = engine();
        let outbox = RecordingOutbox::new();
        let origin = message("go");
        engine.start(FlowKind::FoodSearch, &origin, &outbox).await.expect("start");
        let before = engine.pending_ask(&origin.session_key()).await;

        for _ in 0..25 {
            assert_eq!(engine.resume(&message("hmm"), &outbox).await, ResumeOutcome::Repeated);
        }

        let texts = outbox.texts().await;
        assert_eq!(texts.len(), 26);
        assert!(texts.iter().all(|text| text == "Continue?"));
        assert_eq!(engine.pending_ask(&origin.session_key()).await, before);
        let snapshot = engine.snapshot(&origin.session_key()).await.expect("session");
        assert_eq!(snapshot.repeats, 25);
    }

    #[tokio::test]
    async fn branch_advances_then_finishes_and_clears_session() {
        let engine = engine();
        let outbox = RecordingOutbox::new();
        let origin = message("go");
        engine.start(FlowKind::FoodSearch, &origin, &outbox).await.expect("start");

        assert_eq!(engine.resume(&message("yes"), &outbox).await, ResumeOutcome::Advanced);
        assert_eq!(engine.resume(&message("tacos"), &outbox).await, ResumeOutcome::Finished);

        assert_eq!(outbox.texts().await, vec!["Continue?", "Say anything.", "You said tacos"]);
        assert!(!engine.has_session(&origin.session_key()).await);
        assert_eq!(engine.resume(&message("again"), &outbox).await, ResumeOutcome::NoSession);
    }

    #[tokio::test]
    async fn sessions_are_independent_per_user_and_channel() {
        let engine = engine();
        let outbox = RecordingOutbox::new();
        let alice = InboundMessage::new("U1", "C1", MessageContext::Mention, "go");
        let bob = InboundMessage::new("U2", "C1", MessageContext::Mention, "go");

        engine.start(FlowKind::FoodSearch, &alice, &outbox).await.expect("start alice");
        engine.start(FlowKind::FoodSearch, &bob, &outbox).await.expect("start bob");
        let alice_no = InboundMessage { text: "no".to_owned(), ..alice.clone() };

        assert_eq!(engine.resume(&alice_no, &outbox).await, ResumeOutcome::Finished);
        assert!(!engine.has_session(&alice.session_key()).await);
        assert!(engine.has_session(&bob.session_key()).await);
        assert_eq!(engine.session_count().await, 1);
    }

    #[tokio::test]
    async fn sweep_drops_only_idle_sessions() {
        let mut engine =
            ConversationEngine::new(Utterances::default(), Some(StdDuration::from_secs(60)));
        engine.register(ScriptedFlow);
        let outbox = RecordingOutbox::new();
        engine.start(FlowKind::FoodSearch, &message("go"), &outbox).await.expect("start");

        assert_eq!(engine.sweep_expired(Utc::now()).await, 0);
        assert_eq!(engine.sweep_expired(Utc::now() + Duration::minutes(5)).await, 1);
        assert_eq!(engine.session_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_is_a_no_op_without_timeout() {
        let engine = engine();
        let outbox = RecordingOutbox::new();
        engine.start(FlowKind::FoodSearch, &message("go"), &outbox).await.expect("start");

        assert_eq!(engine.sweep_expired(Utc::now() + Duration::days(30)).await, 0);
        assert_eq!(engine.session_count().await, 1);
    }
}
