//! Builder for outgoing multipart messages.

use crate::content_type::ContentType;
use crate::encoding::{
    encode_base64_wrapped, encode_quoted_printable, encode_rfc2047, encode_rfc2231,
};
use crate::header::Headers;
use crate::message::{Message, Part, TransferEncoding};
use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest line allowed in a 7bit body (RFC 5322).
const MAX_7BIT_LINE: usize = 998;

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds a `multipart/mixed` message with a plain-text body and any number
/// of binary attachments.
///
/// Headers are emitted in the order `From`, `To`, `Date`, `Subject`,
/// `MIME-Version`, `Content-Type`.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    date: Option<String>,
    subject: Option<String>,
    text: Option<String>,
    attachments: Vec<Part>,
    boundary: Option<String>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `From` header.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Sets the `To` header; addresses are joined with `", "`.
    #[must_use]
    pub fn to<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `Date` header from a timestamp, formatted per RFC 2822.
    ///
    /// When unset, [`build`](Self::build) uses the current local time.
    #[must_use]
    pub fn date<Tz>(mut self, date: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.date = Some(date.to_rfc2822());
        self
    }

    /// Sets the `Subject` header, RFC 2047 encoded when not plain ASCII.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the plain-text body, sent as the first part.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds an `application/octet-stream` attachment.
    #[must_use]
    pub fn binary_attachment(self, filename: &str, data: &[u8]) -> Self {
        self.attach(attachment_part(filename, data))
    }

    /// Adds a prepared part after the text body.
    #[must_use]
    pub fn attach(mut self, part: Part) -> Self {
        self.attachments.push(part);
        self
    }

    /// Overrides the generated multipart boundary.
    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Returns the number of attachment parts added so far.
    #[must_use]
    pub const fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Builds the message.
    #[must_use]
    pub fn build(self) -> Message {
        let mut headers = Headers::new();
        if let Some(from) = self.from {
            headers.add("From", from);
        }
        if !self.to.is_empty() {
            headers.add("To", self.to.join(", "));
        }
        headers.add(
            "Date",
            self.date.unwrap_or_else(|| Local::now().to_rfc2822()),
        );
        if let Some(subject) = self.subject {
            headers.add("Subject", encode_rfc2047(&subject, "utf-8"));
        }
        headers.add("MIME-Version", "1.0");

        let boundary = self.boundary.unwrap_or_else(generate_boundary);
        headers.add(
            "Content-Type",
            ContentType::multipart_mixed(boundary).to_string(),
        );

        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        parts.push(text_part(self.text.as_deref().unwrap_or_default()));
        parts.extend(self.attachments);

        Message::multipart(headers, parts)
    }
}

/// Creates a `text/plain; charset=utf-8` part.
///
/// ASCII text with reasonable line lengths goes out as `7bit` with CRLF
/// line endings; anything else is quoted-printable.
#[must_use]
pub fn text_part(text: &str) -> Part {
    let mut headers = Headers::new();
    headers.add("Content-Type", ContentType::text_plain().to_string());

    let fits_7bit = text.is_ascii() && text.lines().all(|line| line.len() <= MAX_7BIT_LINE);
    let (encoding, body) = if fits_7bit {
        let body = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\r\n");
        (TransferEncoding::SevenBit, body)
    } else {
        (
            TransferEncoding::QuotedPrintable,
            encode_quoted_printable(text),
        )
    };

    headers.add("Content-Transfer-Encoding", encoding.to_string());
    Part::new(headers, body.into_bytes())
}

/// Creates an `application/octet-stream` attachment part with a base64
/// body and a `Content-Disposition` naming `filename`.
#[must_use]
pub fn attachment_part(filename: &str, data: &[u8]) -> Part {
    let mut headers = Headers::new();
    headers.add("Content-Type", ContentType::octet_stream().to_string());
    headers.add(
        "Content-Transfer-Encoding",
        TransferEncoding::Base64.to_string(),
    );

    headers.add("Content-Disposition", disposition(filename));

    Part::new(headers, encode_base64_wrapped(data).into_bytes())
}

/// Renders `attachment; filename=...`.
///
/// Printable ASCII names go out as a quoted string. Anything else uses the
/// RFC 2231 extended form, since encoded words are not allowed inside
/// quoted strings.
fn disposition(filename: &str) -> String {
    if filename.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        let quoted = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{quoted}\"")
    } else {
        format!("attachment; filename*={}", encode_rfc2231(filename, "utf-8"))
    }
}

/// Generates a boundary that is unique within this process.
fn generate_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    let counter = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "=_outbox_{nanos:x}_{:x}_{counter:x}",
        std::process::id()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-10-16T09:30:00+02:00").unwrap()
    }

    #[test]
    fn test_header_order_and_values() {
        let message = MessageBuilder::new()
            .from("sender@example.com")
            .to(["a@x.com", "b@x.com"])
            .date(&fixed_date())
            .subject("Hi")
            .text_body("Body text")
            .boundary("BOUNDARY")
            .build();

        let names: Vec<&str> = message.headers.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["From", "To", "Date", "Subject", "MIME-Version", "Content-Type"]
        );
        assert_eq!(message.to(), Some("a@x.com, b@x.com"));
        assert_eq!(message.date(), Some("Fri, 16 Oct 2026 09:30:00 +0200"));
        assert_eq!(
            message.headers.get("Content-Type"),
            Some("multipart/mixed; boundary=BOUNDARY")
        );
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.text_part().unwrap(), "Body text");
    }

    #[test]
    fn test_default_date_is_rfc2822() {
        let message = MessageBuilder::new().text_body("x").build();
        let date = message.date().unwrap();
        assert!(DateTime::parse_from_rfc2822(date).is_ok(), "bad date: {date}");
    }

    #[test]
    fn test_generated_boundaries_differ() {
        let first = MessageBuilder::new().build();
        let second = MessageBuilder::new().build();
        let boundary = |m: &Message| m.content_type().unwrap().boundary().unwrap().to_string();
        assert_ne!(boundary(&first), boundary(&second));
    }

    #[test]
    fn test_text_part_seven_bit_normalises_line_endings() {
        let part = text_part("one\ntwo\r\nthree");
        assert_eq!(part.transfer_encoding(), TransferEncoding::SevenBit);
        assert_eq!(part.body, b"one\r\ntwo\r\nthree");
    }

    #[test]
    fn test_text_part_non_ascii_is_quoted_printable() {
        let part = text_part("Grüße");
        assert_eq!(part.transfer_encoding(), TransferEncoding::QuotedPrintable);
        assert_eq!(part.body_text().unwrap(), "Grüße");
    }

    #[test]
    fn test_attachment_part_headers() {
        let part = attachment_part("report.pdf", b"%PDF-1.4...");
        assert_eq!(
            part.headers.get("Content-Type"),
            Some("application/octet-stream")
        );
        assert_eq!(part.transfer_encoding(), TransferEncoding::Base64);
        assert_eq!(
            part.headers.get("Content-Disposition"),
            Some("attachment; filename=\"report.pdf\"")
        );
        assert_eq!(part.decode_body().unwrap(), b"%PDF-1.4...");
    }

    #[test]
    fn test_attachment_part_non_ascii_filename() {
        let part = attachment_part("résumé.txt", b"cv");
        assert_eq!(
            part.headers.get("Content-Disposition"),
            Some("attachment; filename*=utf-8''r%C3%A9sum%C3%A9.txt")
        );
        assert_eq!(part.filename().as_deref(), Some("résumé.txt"));
    }

    #[test]
    fn test_attachment_part_ascii_specials_kept_verbatim() {
        let part = attachment_part("q3=final?.pdf", b"%PDF");
        assert_eq!(
            part.headers.get("Content-Disposition"),
            Some("attachment; filename=\"q3=final?.pdf\"")
        );
        assert_eq!(part.filename().as_deref(), Some("q3=final?.pdf"));

        let part = attachment_part(r#"say "hi"; \o/.txt"#, b"");
        assert_eq!(
            part.headers.get("Content-Disposition"),
            Some(r#"attachment; filename="say \"hi\"; \\o/.txt""#)
        );
        assert_eq!(part.filename().as_deref(), Some(r#"say "hi"; \o/.txt"#));
    }

    #[test]
    fn test_long_headers_stay_within_line_limit() {
        let recipients: Vec<String> = (0..60)
            .map(|n| format!("recipient-{n:02}@example.com"))
            .collect();
        let subject = "s".repeat(1100);
        let message = MessageBuilder::new()
            .from("sender@example.com")
            .to(recipients.clone())
            .date(&fixed_date())
            .subject(subject.clone())
            .text_body("Body text")
            .build();

        let rendered = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        for line in rendered.split("\r\n") {
            assert!(line.len() <= 998, "line of {} octets", line.len());
        }

        let parsed = Message::parse(&rendered).unwrap();
        assert_eq!(parsed.to(), Some(recipients.join(", ").as_str()));
        assert_eq!(parsed.decoded_subject().unwrap(), subject);
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let message = MessageBuilder::new().subject("Grüße").build();
        assert!(message.subject().unwrap().starts_with("=?utf-8?B?"));
        assert_eq!(message.decoded_subject().unwrap(), "Grüße");
    }

    #[test]
    fn test_rendered_message_parses_back() {
        let message = MessageBuilder::new()
            .from("sender@example.com")
            .to(["a@x.com"])
            .subject("Report")
            .text_body("See attached.")
            .binary_attachment("data.bin", &[0, 159, 146, 150, 255])
            .build();

        let raw = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        let parsed = Message::parse(&raw).unwrap();

        assert_eq!(parsed.headers, message.headers);
        assert_eq!(parsed.parts, message.parts);
    }
}
