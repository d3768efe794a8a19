//! Rule, match and action definitions, and rule file loading

use mailflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Identifier of a rule. May be empty.
pub type RuleId = String;

/// Kind of match predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    /// Always true
    MatchAll,
    /// Bare address of the field equals the value
    MatchLiteral,
    /// Raw field value matches a `*` wildcard pattern
    MatchRegex,
    /// Wall-clock time is past the value (ms since epoch)
    MatchTimeAfter,
    /// Any kind this engine does not know about
    #[serde(other)]
    Unsupported,
}

/// Email field a match reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchField {
    From,
    To,
}

/// Kind of action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    ActionDrop,
    ActionForward,
    ActionWebhook,
    #[serde(other)]
    Unsupported,
}

/// A single predicate over an email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "type")]
    pub kind: MatchKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<MatchField>,
    #[serde(default)]
    pub value: String,
}

impl Match {
    pub fn all() -> Self {
        Self {
            kind: MatchKind::MatchAll,
            field: None,
            value: String::new(),
        }
    }

    pub fn literal(field: MatchField, value: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::MatchLiteral,
            field: Some(field),
            value: value.into(),
        }
    }

    pub fn wildcard(field: MatchField, pattern: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::MatchRegex,
            field: Some(field),
            value: pattern.into(),
        }
    }

    pub fn time_after(epoch_ms: i64) -> Self {
        Self {
            kind: MatchKind::MatchTimeAfter,
            field: None,
            value: epoch_ms.to_string(),
        }
    }
}

/// Something to do with a matched email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Forwarding destinations or webhook URLs, in order
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Action {
    pub fn drop() -> Self {
        Self {
            kind: ActionKind::ActionDrop,
            targets: Vec::new(),
        }
    }

    pub fn forward<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ActionKind::ActionForward,
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn webhook(url: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::ActionWebhook,
            targets: vec![url.into()],
        }
    }
}

/// Matches (combined with AND) and the actions to run when they all hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: RuleId,
    #[serde(default, rename = "match")]
    pub matches: Vec<Match>,
    #[serde(default, rename = "action")]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(id: impl Into<RuleId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn when(mut self, m: Match) -> Self {
        self.matches.push(m);
        self
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// An ordered list of rules; the first one that matches wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleFile {
    List(Vec<Rule>),
    Table(RuleSet),
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Load rules from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read rule file {}: {}",
                path.display(),
                e
            ))
        })?;

        let rules = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            Some("toml") | None => Self::from_toml_str(&content)?,
            Some(other) => {
                return Err(Error::Config(format!(
                    "Unknown rule file extension '{}'",
                    other
                )))
            }
        };

        debug!("Loaded {} rules from {}", rules.len(), path.display());
        Ok(rules)
    }

    /// Parse `[[rules]]` tables
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse rules: {}", e)))
    }

    /// Parse a JSON array of rules or an object with a `rules` array
    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse rules: {}", e)))?;

        Ok(match file {
            RuleFile::List(rules) => Self::new(rules),
            RuleFile::Table(set) => set,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self::new(rules)
    }
}
