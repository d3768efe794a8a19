//! Mailflow - evaluate one message against the configured rules
//!
//! Usage: `mailflow [MESSAGE_FILE]` (reads stdin without a file).
//! Each decision is printed as a JSON line on stdout; logs go to stderr.

use anyhow::{Context, Result};
use mailflow_common::config::{Config, LoggingConfig};
use mailflow_common::Email;
use mailflow_core::{parse_email, ActionEvent, MailDbClient, RuleEngine, RuleSet, StatusReporter};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("MAILFLOW_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    init_logging(&config.logging);

    let rules = RuleSet::from_file(&config.rules.path)?;
    info!("Loaded {} rules from {}", rules.len(), config.rules.path.display());

    let raw = read_message(std::env::args_os().nth(1).map(PathBuf::from)).await?;
    let email = parse_email(&raw, None)?;

    let message_id = Uuid::now_v7();

    let reporter = if config.maildb.enabled {
        let domain = recipient_domain(&email)
            .context("Message has no recipient domain to report status under")?;
        let client = MailDbClient::new(config.maildb.clone())?;
        client.new_message(&domain, message_id).await?;
        Some((client, domain))
    } else {
        None
    };

    // Stop waiting on the consumer when interrupted
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling evaluation");
                shutdown.cancel();
            }
        });
    }

    let engine = RuleEngine::new(rules)
        .with_send_timeout(config.dispatch.send_timeout())
        .with_cancellation(shutdown);

    let (evaluation, mut events) = engine.spawn(email);
    while let Some(event) = events.next().await {
        println!("{}", decision_line(&event));
    }

    let selected = match evaluation.await.context("rule evaluation task failed")? {
        Ok(selected) => selected,
        Err(e) => {
            error!("Rule evaluation failed ({}): {}", e.code(), e);
            return Err(e.into());
        }
    };

    match &selected {
        Some(rule_id) => info!("Message {} handled by rule '{}'", message_id, rule_id),
        None => info!("Message {} matched no rule", message_id),
    }

    if let (Some((reporter, domain)), Some(rule_id)) = (&reporter, &selected) {
        reporter
            .set_field(domain, message_id, "rule", rule_id)
            .await?;
    }

    Ok(())
}

/// Domain of the first envelope recipient, lowercased
fn recipient_domain(email: &Email) -> Option<String> {
    email
        .envelope()
        .to
        .first()
        .and_then(|rcpt| rcpt.rsplit_once('@'))
        .map(|(_, domain)| domain.trim().to_lowercase())
        .filter(|domain| !domain.is_empty())
}

async fn read_message(path: Option<PathBuf>) -> Result<Vec<u8>> {
    match path {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read message {}", path.display())),
        None => {
            let mut raw = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut raw)
                .await
                .context("Failed to read message from stdin")?;
            Ok(raw)
        }
    }
}

/// One compact JSON line per decision; forwarded mail is not echoed back
fn decision_line(event: &ActionEvent) -> serde_json::Value {
    match event {
        ActionEvent::Drop(drop) => serde_json::json!({
            "event": "drop",
            "dropped_by_rule": drop.dropped_by_rule,
        }),
        ActionEvent::Send(send) => serde_json::json!({
            "event": "send",
            "to": send.to,
        }),
        ActionEvent::Accept { accepted } => serde_json::json!({
            "event": "accept",
            "accepted": accepted,
        }),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
