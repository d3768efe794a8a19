//! Mailflow Core - mail rule matching and action dispatch
//!
//! This crate decides what happens to an incoming email: it evaluates an
//! ordered list of rules, streams the resulting drop/forward/webhook events
//! to a consumer, and provides the client used to report message status to
//! the mail database.

pub mod maildb;
pub mod message;
pub mod rules;

pub use maildb::{MailDbClient, MessageId, StatusReporter};
pub use message::parse_email;
pub use rules::{
    action_channels, apply, ActionDrop, ActionEvent, ActionReceivers, ActionSend, ActionSenders,
    Rule, RuleEngine, RuleId, RuleSet,
};
