//! Error types for Mailflow

use std::time::Duration;
use thiserror::Error;

/// Main error type for Mailflow
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message parse error: {0}")]
    Parse(String),

    #[error("Invalid wildcard pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid timestamp '{0}': expected milliseconds since the Unix epoch")]
    InvalidTimestamp(String),

    #[error("Unsupported match type: {0}")]
    UnsupportedMatch(String),

    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    #[error("Match {0} requires a field")]
    MissingField(String),

    #[error("Action channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Action dispatch cancelled")]
    Cancelled,

    #[error("Action dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("maildb returned code {status} for {endpoint}: {body}")]
    MailDb {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Mailflow
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::InvalidPattern { .. } => "INVALID_PATTERN",
            Error::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            Error::UnsupportedMatch(_) => "UNSUPPORTED_MATCH",
            Error::UnsupportedAction(_) => "UNSUPPORTED_ACTION",
            Error::MissingField(_) => "MISSING_FIELD",
            Error::ChannelClosed(_) => "CHANNEL_CLOSED",
            Error::Cancelled => "CANCELLED",
            Error::Timeout(_) => "TIMEOUT",
            Error::MailDb { .. } => "MAILDB_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error was caused by a malformed rule or message.
    ///
    /// Input errors abort the current evaluation; the message should be
    /// treated as unprocessed.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::InvalidPattern { .. }
                | Error::InvalidTimestamp(_)
                | Error::UnsupportedMatch(_)
                | Error::UnsupportedAction(_)
                | Error::MissingField(_)
        )
    }

    /// Whether the error came from talking to the mail-status service
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::MailDb { .. } | Error::Transport(_))
    }
}
