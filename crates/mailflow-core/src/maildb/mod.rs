//! Mail-status service integration

mod client;

pub use client::{MailDbClient, MessageId, StatusReporter};
