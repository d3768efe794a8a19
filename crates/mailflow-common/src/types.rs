//! Common types for Mailflow

use serde::{Deserialize, Serialize};

/// Message envelope (SMTP level)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender (MAIL FROM)
    pub from: String,

    /// Recipients (RCPT TO), in the order they were given
    pub to: Vec<String>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(from: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            from: from.into(),
            to,
        }
    }
}

/// Raw message headers.
///
/// Names keep their received spelling and order; lookups ignore case and
/// only the first value received for a name is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, ignoring it if one with the same name is already present
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self.get(&name).is_none() {
            self.entries.push((name, value.into()));
        }
    }

    /// Builder-style [`Headers::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get the raw value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(name, value)` pairs in received order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// An incoming email as seen by the rule engine.
///
/// Immutable once built; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    envelope: Envelope,
    headers: Headers,
}

impl Email {
    /// Create a new email from its envelope and headers
    pub fn new(envelope: Envelope, headers: Headers) -> Self {
        Self { envelope, headers }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw `From` header, falling back to the envelope sender
    pub fn from_field(&self) -> String {
        match self.headers.get("From") {
            Some(from) => from.to_string(),
            None => self.envelope.from.clone(),
        }
    }

    /// Raw `To` header, falling back to the envelope recipients
    pub fn to_field(&self) -> String {
        match self.headers.get("To") {
            Some(to) => to.to_string(),
            None => self.envelope.to.join(", "),
        }
    }
}

/// Strip a display name from an address: `Name <addr>` becomes `addr`.
///
/// Values without angle brackets are returned trimmed.
pub fn extract_address(value: &str) -> &str {
    let value = value.trim();
    if let Some(start) = value.rfind('<') {
        if let Some(len) = value[start + 1..].find('>') {
            return value[start + 1..start + 1 + len].trim();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_email() -> Email {
        Email::new(
            Envelope::new("bounce@b.ee", vec!["sven@gmail.com".to_string()]),
            Headers::new()
                .with("From", "Sven <sven@b.ee>")
                .with("To", "sven@gmail.com")
                .with("Subject", "test"),
        )
    }

    #[test]
    fn test_headers_case_insensitive() {
        let email = sample_email();
        assert_eq!(email.headers().get("subject"), Some("test"));
        assert_eq!(email.headers().get("SUBJECT"), Some("test"));
        assert_eq!(email.headers().get("Cc"), None);
    }

    #[test]
    fn test_headers_keep_first_value() {
        let headers: Headers = vec![("Received", "first"), ("received", "second")]
            .into_iter()
            .collect();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Received"), Some("first"));
    }

    #[test]
    fn test_fields_prefer_headers() {
        let email = sample_email();
        assert_eq!(email.from_field(), "Sven <sven@b.ee>");
        assert_eq!(email.to_field(), "sven@gmail.com");
    }

    #[test]
    fn test_fields_fall_back_to_envelope() {
        let email = Email::new(
            Envelope::new(
                "a@b.ee",
                vec!["x@test.com".to_string(), "y@test.com".to_string()],
            ),
            Headers::new(),
        );
        assert_eq!(email.from_field(), "a@b.ee");
        assert_eq!(email.to_field(), "x@test.com, y@test.com");
    }

    #[test]
    fn test_extract_address() {
        assert_eq!(extract_address("Tom <mail@jack.uk>"), "mail@jack.uk");
        assert_eq!(extract_address("<mail@jack.uk>"), "mail@jack.uk");
        assert_eq!(extract_address("  a@gmail.com "), "a@gmail.com");
        assert_eq!(extract_address("\"Doe, <John>\" <j@d.com>"), "j@d.com");
        assert_eq!(extract_address("broken <addr"), "broken <addr");
    }
}
