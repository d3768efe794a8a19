//! Rule Engine - selects the first matching rule and dispatches its actions
//!
//! Rules are evaluated in order. The first rule whose matches all hold wins:
//! its actions are streamed to the consumer through the action channels and
//! no later rule is considered. When nothing matches, a single default drop
//! is emitted.

use chrono::{DateTime, Utc};
use mailflow_common::{Email, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::channels::{action_channels, ActionDrop, ActionReceivers, ActionSend, ActionSenders};
use super::matcher::evaluate_at;
use super::model::{Action, ActionKind, Rule, RuleId, RuleSet};

/// Apply `rules` to `email`, streaming the resulting actions to `out`.
///
/// Returns the id of the rule that fired, or `None` when no rule matched
/// and the message was dropped by default. Any error aborts the evaluation
/// immediately; the message should then be treated as unprocessed.
pub async fn apply(rules: &[Rule], email: &Email, out: &ActionSenders) -> Result<Option<RuleId>> {
    apply_at(rules, email, out, Utc::now()).await
}

/// [`apply`] with an explicit notion of "now" for time-gated matches
pub async fn apply_at(
    rules: &[Rule],
    email: &Email,
    out: &ActionSenders,
    now: DateTime<Utc>,
) -> Result<Option<RuleId>> {
    debug!("Evaluating {} rules", rules.len());

    for (position, rule) in rules.iter().enumerate() {
        if !evaluate_at(&rule.matches, email, now)? {
            debug!("Rule '{}' (#{}) did not match", rule.id, position);
            continue;
        }

        info!(
            "Rule '{}' (#{}) matched, running {} actions",
            rule.id,
            position,
            rule.actions.len()
        );

        for action in &rule.actions {
            dispatch(action, email, out).await?;
        }

        return Ok(Some(rule.id.clone()));
    }

    debug!("No rule matched, dropping by default");
    out.emit_drop(ActionDrop {
        dropped_by_rule: false,
    })
    .await?;

    Ok(None)
}

/// Emit the events for a single action
async fn dispatch(action: &Action, email: &Email, out: &ActionSenders) -> Result<()> {
    match action.kind {
        ActionKind::ActionDrop => {
            out.emit_drop(ActionDrop {
                dropped_by_rule: true,
            })
            .await
        }
        ActionKind::ActionForward => {
            for target in &action.targets {
                debug!("Forwarding to {}", target);
                out.emit_send(ActionSend {
                    to: target.clone(),
                    email: email.clone(),
                })
                .await?;
            }
            Ok(())
        }
        ActionKind::ActionWebhook => {
            // The webhook itself is called by the consumer; only its
            // provisional acceptance is signalled here.
            debug!("Webhook action for {:?}", action.targets);
            out.emit_accept(true).await
        }
        ActionKind::Unsupported => Err(Error::UnsupportedAction(format!("{:?}", action.kind))),
    }
}

/// Shares one rule set across many concurrent evaluations
#[derive(Clone)]
pub struct RuleEngine {
    rules: Arc<RuleSet>,
    send_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl RuleEngine {
    /// Create a new rule engine
    pub fn new(rules: impl Into<Arc<RuleSet>>) -> Self {
        Self {
            rules: rules.into(),
            send_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound how long each event hand-off may wait for the consumer
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Cancel in-flight evaluations when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Start evaluating `email` as a separate task.
    ///
    /// The task blocks on every event until it is read from the returned
    /// receivers, so they must be drained for the task to finish.
    pub fn spawn(&self, email: Email) -> (JoinHandle<Result<Option<RuleId>>>, ActionReceivers) {
        let (senders, receivers) = action_channels();
        let mut senders = senders.with_cancellation(self.cancel.child_token());
        if let Some(timeout) = self.send_timeout {
            senders = senders.with_send_timeout(timeout);
        }

        let rules = self.rules.clone();
        let handle = tokio::spawn(async move { apply(rules.rules(), &email, &senders).await });

        (handle, receivers)
    }
}
