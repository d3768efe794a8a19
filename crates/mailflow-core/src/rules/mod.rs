//! Rule Engine Module
//!
//! Evaluates ordered mail rules against an email and streams the resulting
//! drop/forward/webhook decisions to a consumer.

mod channels;
mod engine;
mod matcher;
mod model;

pub use channels::{
    action_channels, rendezvous, ActionDrop, ActionEvent, ActionReceivers, ActionSend,
    ActionSenders, RendezvousReceiver, RendezvousSender,
};
pub use engine::{apply, apply_at, RuleEngine};
pub use matcher::{compile_wildcard, evaluate, evaluate_at};
pub use model::{Action, ActionKind, Match, MatchField, MatchKind, Rule, RuleId, RuleSet};
