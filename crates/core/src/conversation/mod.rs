//! Conversation engine: sessions that ask one question at a time and branch on replies.

pub mod engine;
pub mod session;
pub mod utterances;

pub use engine::{
    classify, Classification, ConversationEngine, ConversationError, ConversationFlow, Next,
    Reply, ResumeOutcome, SessionStatus, Turn,
};
pub use session::{
    Ask, Branch, BranchAction, ConversationSession, Expect, FlowKind, GameState, Pattern, Step,
};
pub use utterances::{Answer, Utterances};
