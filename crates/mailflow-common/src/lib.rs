//! Mailflow Common - Shared types and utilities
//!
//! This crate provides configuration, error types and the email model
//! shared across all Mailflow components.

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::Config;
pub use error::{Error, Result};
pub use types::{extract_address, Email, Envelope, Headers};
