//! Building an [`Email`] from a raw RFC 5322 message

use mail_parser::MessageParser;
use mailflow_common::{extract_address, Email, Envelope, Error, Headers, Result};
use tracing::debug;

/// Parse a raw message into an [`Email`].
///
/// Header values are kept as received (unfolded and trimmed), first value
/// per name. When `envelope` is `None` it is derived from the `From` and
/// `To` headers.
pub fn parse_email(raw: &[u8], envelope: Option<Envelope>) -> Result<Email> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("Failed to parse message".to_string()))?;

    let mut headers = Headers::new();
    for header in parsed.headers() {
        let start = header.offset_start as usize;
        let end = header.offset_end as usize;
        let value = raw
            .get(start..end)
            .map(|bytes| unfold(&String::from_utf8_lossy(bytes)))
            .unwrap_or_default();
        headers.insert(header.name(), value);
    }

    if headers.is_empty() {
        return Err(Error::Parse("Message has no headers".to_string()));
    }

    let envelope = envelope.unwrap_or_else(|| derive_envelope(&headers));
    debug!(
        "Parsed message from={} to={:?} headers={}",
        envelope.from,
        envelope.to,
        headers.len()
    );

    Ok(Email::new(envelope, headers))
}

fn derive_envelope(headers: &Headers) -> Envelope {
    let from = headers
        .get("From")
        .map(|v| extract_address(v).to_string())
        .unwrap_or_default();
    let to = headers
        .get("To")
        .map(|v| {
            split_addresses(v)
                .into_iter()
                .map(|a| extract_address(a).to_string())
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Envelope::new(from, to)
}

/// Split an address list on commas outside quotes and angle brackets
fn split_addresses(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts
}

fn unfold(value: &str) -> String {
    value.replace("\r\n", "").replace('\n', "").trim().to_string()
}
