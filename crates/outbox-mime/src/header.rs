//! MIME header handling.

use crate::error::{Error, Result};
use std::fmt;

/// Preferred length of a rendered header line (RFC 5322 section 2.1.1).
const FOLD_WIDTH: usize = 78;

/// Ordered collection of email headers.
///
/// Names keep the case they were added with; lookups are
/// case-insensitive. Rendering preserves insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value, keeping any existing values.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of header lines.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parses headers from raw text.
    ///
    /// Parsing stops at the first empty line. Continuation lines (starting
    /// with a space or tab) are unfolded into the previous header.
    ///
    /// # Errors
    ///
    /// Returns an error if a header line has no colon or a continuation
    /// line appears before any header.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let (_, value) = headers.entries.last_mut().ok_or_else(|| {
                    Error::InvalidHeader(format!("Continuation without header: {line}"))
                })?;
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidHeader(line.to_string()))?;
            headers.add(name.trim(), value.trim());
        }

        Ok(headers)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write_folded(f, name, value)?;
        }
        Ok(())
    }
}

/// Writes `name: value`, folding before a space whenever the line would
/// pass [`FOLD_WIDTH`]. Line breaks already in `value` are unfolded first.
///
/// A run without spaces is never split, so it must fit the 998 octet
/// line limit on its own.
fn write_folded(f: &mut fmt::Formatter<'_>, name: &str, value: &str) -> fmt::Result {
    let unfolded = value.replace("\r\n", "");
    write!(f, "{name}:")?;

    let mut width = name.len() + 1;
    for (i, word) in unfolded.split(' ').enumerate() {
        if i > 0 && !word.is_empty() && width + 1 + word.len() > FOLD_WIDTH {
            f.write_str("\r\n")?;
            width = 0;
        }
        write!(f, " {word}")?;
        width += 1 + word.len();
    }

    f.write_str("\r\n")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("Body").is_none());
    }

    #[test]
    fn test_headers_parse_rejects_garbage() {
        assert!(Headers::parse("no colon here\r\n").is_err());
        assert!(Headers::parse(" leading continuation\r\n").is_err());
    }

    #[test]
    fn test_headers_display_keeps_order() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");
        headers.add("Date", "Thu, 15 Oct 2026 10:00:00 +0000");

        assert_eq!(
            headers.to_string(),
            concat!(
                "From: sender@example.com\r\n",
                "To: recipient@example.com\r\n",
                "Date: Thu, 15 Oct 2026 10:00:00 +0000\r\n",
            )
        );
    }

    #[test]
    fn test_long_address_list_is_folded() {
        let recipients: Vec<String> = (0..60)
            .map(|n| format!("recipient-{n:02}@example.com"))
            .collect();
        let mut headers = Headers::new();
        headers.add("To", recipients.join(", "));

        let rendered = headers.to_string();
        let lines: Vec<&str> = rendered.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert!(lines.len() > 1);
        assert!(lines[0].starts_with("To: recipient-00@example.com,"));
        for line in &lines {
            assert!(line.len() <= FOLD_WIDTH, "line too long: {line}");
        }
        for line in &lines[1..] {
            assert!(line.starts_with(' '));
        }

        let parsed = Headers::parse(&rendered).unwrap();
        assert_eq!(parsed.get("To"), Some(recipients.join(", ").as_str()));
    }

    #[test]
    fn test_short_header_is_not_folded() {
        let mut headers = Headers::new();
        headers.add("Subject", "");
        headers.add("X-Note", "two  spaces");
        assert_eq!(headers.to_string(), "Subject: \r\nX-Note: two  spaces\r\n");
    }

    #[test]
    fn test_existing_line_breaks_are_refolded() {
        let mut headers = Headers::new();
        headers.add("Subject", "=?utf-8?B?QQ==?=\r\n =?utf-8?B?Qg==?=");
        assert_eq!(
            headers.to_string(),
            "Subject: =?utf-8?B?QQ==?= =?utf-8?B?Qg==?=\r\n"
        );
    }
}
