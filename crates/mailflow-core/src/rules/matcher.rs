//! Match evaluation - decides whether all predicates of a rule hold

use chrono::{DateTime, Utc};
use mailflow_common::{extract_address, Email, Error, Result};
use regex::Regex;
use tracing::debug;

use super::model::{Match, MatchField, MatchKind};

/// Evaluate all matches (AND logic) against the current wall-clock time
pub fn evaluate(matches: &[Match], email: &Email) -> Result<bool> {
    evaluate_at(matches, email, Utc::now())
}

/// Evaluate all matches (AND logic) with an explicit notion of "now".
///
/// An empty list matches. Evaluation stops at the first predicate that is
/// false; an error in any evaluated predicate aborts the whole evaluation.
pub fn evaluate_at(matches: &[Match], email: &Email, now: DateTime<Utc>) -> Result<bool> {
    for m in matches {
        if !evaluate_match(m, email, now)? {
            debug!("Match {:?} '{}' did not hold", m.kind, m.value);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Evaluate a single predicate
fn evaluate_match(m: &Match, email: &Email, now: DateTime<Utc>) -> Result<bool> {
    match m.kind {
        MatchKind::MatchAll => Ok(true),
        MatchKind::MatchLiteral => {
            let value = field_value(m, email)?;
            Ok(extract_address(&value) == m.value)
        }
        MatchKind::MatchRegex => {
            let value = field_value(m, email)?;
            let pattern = compile_wildcard(&m.value)?;
            Ok(pattern.is_match(&value))
        }
        MatchKind::MatchTimeAfter => {
            let threshold = m
                .value
                .parse::<i64>()
                .map_err(|_| Error::InvalidTimestamp(m.value.clone()))?;
            Ok(now.timestamp_millis() > threshold)
        }
        MatchKind::Unsupported => Err(Error::UnsupportedMatch(format!("{:?}", m.kind))),
    }
}

/// Raw value of the field a match reads
fn field_value(m: &Match, email: &Email) -> Result<String> {
    match m.field {
        Some(MatchField::From) => Ok(email.from_field()),
        Some(MatchField::To) => Ok(email.to_field()),
        None => Err(Error::MissingField(format!("{:?}", m.kind))),
    }
}

/// Compile a wildcard pattern into an anchored regex.
///
/// `*` matches any run of characters (including none); everything else is
/// literal and the whole value must match.
pub fn compile_wildcard(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("^(?s:{})$", body)).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
