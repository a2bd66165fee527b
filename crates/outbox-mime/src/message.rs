//! MIME message structure, rendering and parsing.

use crate::content_type::ContentType;
use crate::encoding::{
    decode_base64, decode_quoted_printable_bytes, decode_rfc2047, decode_rfc2231,
};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Reverses this transfer encoding on a raw body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not validly encoded.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => {
                // Line breaks are part of the wire format, not the payload
                let cleaned: String = String::from_utf8_lossy(body)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                decode_base64(&cleaned)
            }
            Self::QuotedPrintable => decode_quoted_printable_bytes(&String::from_utf8_lossy(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// MIME message part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body, transfer-encoded as it appears on the wire.
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type.
    ///
    /// # Errors
    ///
    /// Returns an error if content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        self.transfer_encoding().decode(&self.body)
    }

    /// Gets the decoded body as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or UTF-8 conversion fails.
    pub fn body_text(&self) -> Result<String> {
        String::from_utf8(self.decode_body()?).map_err(Into::into)
    }

    /// Returns true if the part is marked `Content-Disposition: attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("content-disposition")
            .and_then(|value| value.split(';').next())
            .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("attachment"))
    }

    /// Returns the file name from the `Content-Disposition` header.
    ///
    /// An RFC 2231 `filename*` parameter wins over a plain `filename`.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let disposition = self.headers.get("content-disposition")?;
        let params: Vec<(String, String)> = split_parameters(disposition)
            .into_iter()
            .skip(1)
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                Some((key.trim().to_ascii_lowercase(), value.trim().to_string()))
            })
            .collect();

        let extended = params
            .iter()
            .find(|(key, _)| key == "filename*")
            .and_then(|(_, value)| decode_rfc2231(value).ok());
        extended.or_else(|| {
            params
                .into_iter()
                .find(|(key, _)| key == "filename")
                .map(|(_, value)| decode_rfc2047(&value).unwrap_or(value))
        })
    }
}

/// Splits a header value on `;`, honouring quoted strings. Quotes and
/// backslash escapes are removed from the returned segments.
fn split_parameters(value: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
}

/// MIME message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Message parts (empty for single-part messages).
    pub parts: Vec<Part>,
    /// Body for single-part messages.
    pub body: Option<Vec<u8>>,
}

impl Message {
    /// Creates a single-part message.
    #[must_use]
    pub const fn single_part(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            parts: Vec::new(),
            body: Some(body),
        }
    }

    /// Creates a multipart message.
    ///
    /// The headers must carry a multipart `Content-Type` with a boundary
    /// for the message to render.
    #[must_use]
    pub const fn multipart(headers: Headers, parts: Vec<Part>) -> Self {
        Self {
            headers,
            parts,
            body: None,
        }
    }

    /// Gets the content type.
    ///
    /// # Errors
    ///
    /// Returns an error if content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Checks if this is a multipart message.
    ///
    /// # Errors
    ///
    /// Returns an error if content type cannot be determined.
    pub fn is_multipart(&self) -> Result<bool> {
        Ok(self.content_type()?.is_multipart())
    }

    /// Gets the From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers.get("from")
    }

    /// Gets the To header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.headers.get("to")
    }

    /// Gets the raw Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Gets the Subject header with RFC 2047 words decoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is missing or cannot be decoded.
    pub fn decoded_subject(&self) -> Result<String> {
        let subject = self
            .subject()
            .ok_or_else(|| Error::MissingHeader("Subject".to_string()))?;
        decode_rfc2047(subject)
    }

    /// Gets the Date header.
    #[must_use]
    pub fn date(&self) -> Option<&str> {
        self.headers.get("date")
    }

    /// Gets the body as text for single-part messages.
    ///
    /// # Errors
    ///
    /// Returns an error if this is a multipart message or decoding fails.
    pub fn body_text(&self) -> Result<String> {
        if !self.parts.is_empty() {
            return Err(Error::InvalidMultipart(
                "Use parts for multipart messages".to_string(),
            ));
        }

        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Error::InvalidMultipart("No body".to_string()))?;

        let transfer_encoding = self
            .headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);

        String::from_utf8(transfer_encoding.decode(body)?).map_err(Into::into)
    }

    /// Finds the first text/plain part in a multipart message.
    ///
    /// # Errors
    ///
    /// Returns an error if no text part is found or decoding fails.
    pub fn text_part(&self) -> Result<String> {
        for part in &self.parts {
            if part.content_type()?.is("text", "plain") {
                return part.body_text();
            }
        }

        Err(Error::InvalidMultipart(
            "No text/plain part found".to_string(),
        ))
    }

    /// Returns the parts marked as attachments, in message order.
    pub fn attachments(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|part| part.is_attachment())
    }

    /// Renders the message to its wire format with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart message has no boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(self.headers.to_string().as_bytes());
        out.extend_from_slice(b"\r\n");

        if self.parts.is_empty() {
            if let Some(body) = &self.body {
                out.extend_from_slice(body);
            }
            return Ok(out);
        }

        let content_type = self.content_type()?;
        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;

        for part in &self.parts {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            out.extend_from_slice(part.headers.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Ok(out)
    }

    /// Parses a message from its wire format.
    ///
    /// Handles single-part messages and one level of multipart.
    ///
    /// # Errors
    ///
    /// Returns an error if headers are malformed or the multipart structure
    /// is broken.
    pub fn parse(raw: &str) -> Result<Self> {
        let (head, body) = split_head_body(raw);
        let headers = Headers::parse(head)?;

        let content_type = headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)?;

        if !content_type.is_multipart() {
            return Ok(Self::single_part(headers, body.as_bytes().to_vec()));
        }

        let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
        let parts = split_multipart(body, boundary)?
            .into_iter()
            .map(|section| {
                let (head, body) = split_head_body(section);
                Ok(Part::new(Headers::parse(head)?, body.as_bytes().to_vec()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::multipart(headers, parts))
    }
}

/// Splits raw text at the first empty line.
fn split_head_body(raw: &str) -> (&str, &str) {
    if raw.starts_with("\r\n") {
        return ("", &raw[2..]);
    }
    if let Some(pos) = raw.find("\r\n\r\n") {
        (&raw[..pos + 2], &raw[pos + 4..])
    } else if let Some(pos) = raw.find("\n\n") {
        (&raw[..=pos], &raw[pos + 2..])
    } else {
        (raw, "")
    }
}

/// Splits a multipart body into the raw text of each part.
fn split_multipart<'a>(body: &'a str, boundary: &str) -> Result<Vec<&'a str>> {
    let delimiter = format!("--{boundary}");
    let inner_delimiter = format!("\n{delimiter}");

    let start = if body.starts_with(&delimiter) {
        0
    } else {
        body.find(&inner_delimiter)
            .map(|pos| pos + 1)
            .ok_or_else(|| Error::InvalidMultipart("Missing opening boundary".to_string()))?
    };

    let mut sections = Vec::new();
    let mut rest = &body[start + delimiter.len()..];

    loop {
        if rest.starts_with("--") {
            break;
        }

        let line_end = rest
            .find('\n')
            .ok_or_else(|| Error::InvalidMultipart("Truncated part".to_string()))?;
        rest = &rest[line_end + 1..];

        let next = rest
            .find(&inner_delimiter)
            .ok_or_else(|| Error::InvalidMultipart("Missing closing boundary".to_string()))?;
        let section = &rest[..next];
        sections.push(section.strip_suffix('\r').unwrap_or(section));

        rest = &rest[next + inner_delimiter.len()..];
    }

    Ok(sections)
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
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::Base64.to_string(), "base64");
    }

    #[test]
    fn test_part_body_text() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain; charset=utf-8");
        let part = Part::new(headers, b"Hello, World!".to_vec());

        assert_eq!(part.body_text().unwrap(), "Hello, World!");
        assert!(!part.is_attachment());
        assert!(part.filename().is_none());
    }

    #[test]
    fn test_part_base64_with_line_breaks() {
        let mut headers = Headers::new();
        headers.add("Content-Transfer-Encoding", "base64");
        let part = Part::new(headers, b"SGVsbG8s\r\nIFdvcmxkIQ==".to_vec());

        assert_eq!(part.decode_body().unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_part_filename_quoted_semicolon() {
        let mut headers = Headers::new();
        headers.add(
            "Content-Disposition",
            "attachment; filename=\"a;b \\\"c\\\".txt\"; size=3",
        );
        let part = Part::new(headers, b"abc".to_vec());
        assert_eq!(part.filename().as_deref(), Some("a;b \"c\".txt"));
    }

    #[test]
    fn test_part_filename_extended_wins() {
        let mut headers = Headers::new();
        headers.add(
            "Content-Disposition",
            "attachment; filename=\"cafe.txt\"; filename*=utf-8''caf%C3%A9.txt",
        );
        let part = Part::new(headers, Vec::new());
        assert_eq!(part.filename().as_deref(), Some("café.txt"));
    }

    #[test]
    fn test_part_filename() {
        let mut headers = Headers::new();
        headers.add("Content-Disposition", "attachment; filename=\"report.pdf\"");
        let part = Part::new(headers, Vec::new());

        assert!(part.is_attachment());
        assert_eq!(part.filename().as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_message_single_part() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");
        headers.add("Subject", "Test");

        let message = Message::single_part(headers, b"Hello, World!".to_vec());

        assert_eq!(message.from(), Some("sender@example.com"));
        assert_eq!(message.to(), Some("recipient@example.com"));
        assert_eq!(message.subject(), Some("Test"));
        assert_eq!(message.body_text().unwrap(), "Hello, World!");
        assert_eq!(
            String::from_utf8(message.to_bytes().unwrap()).unwrap(),
            concat!(
                "From: sender@example.com\r\n",
                "To: recipient@example.com\r\n",
                "Subject: Test\r\n",
                "\r\n",
                "Hello, World!"
            )
        );
    }

    #[test]
    fn test_multipart_render_layout() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed; boundary=\"abc\"");

        let mut part1_headers = Headers::new();
        part1_headers.add("Content-Type", "text/plain");
        let part1 = Part::new(part1_headers, b"Part 1".to_vec());

        let mut part2_headers = Headers::new();
        part2_headers.add("Content-Type", "text/plain");
        let part2 = Part::new(part2_headers, b"Part 2".to_vec());

        let message = Message::multipart(headers, vec![part1, part2]);
        assert!(message.is_multipart().unwrap());

        let rendered = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        assert_eq!(
            rendered,
            concat!(
                "Content-Type: multipart/mixed; boundary=\"abc\"\r\n",
                "\r\n",
                "--abc\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "Part 1\r\n",
                "--abc\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "Part 2\r\n",
                "--abc--\r\n",
            )
        );
    }

    #[test]
    fn test_multipart_without_boundary_fails_to_render() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed");
        let part = Part::new(Headers::new(), b"x".to_vec());
        let message = Message::multipart(headers, vec![part]);

        assert!(matches!(message.to_bytes(), Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_parse_multipart_with_preamble() {
        let raw = concat!(
            "From: a@example.com\r\n",
            "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
            "\r\n",
            "This is a multi-part message in MIME format.\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "line one\r\n",
            "line two\r\n",
            "--XYZ\r\n",
            "Content-Type: application/octet-stream\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "Content-Disposition: attachment; filename=\"a.bin\"\r\n",
            "\r\n",
            "AAEC\r\n",
            "--XYZ--\r\n",
        );

        let message = Message::parse(raw).unwrap();
        assert_eq!(message.parts.len(), 2);
        assert_eq!(message.text_part().unwrap(), "line one\r\nline two");

        let attachments: Vec<&Part> = message.attachments().collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename().as_deref(), Some("a.bin"));
        assert_eq!(attachments[0].decode_body().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_single_part() {
        let raw = "Subject: =?utf-8?B?SMOpbGxv?=\r\n\r\nbody";
        let message = Message::parse(raw).unwrap();
        assert!(!message.is_multipart().unwrap());
        assert_eq!(message.decoded_subject().unwrap(), "Héllo");
        assert_eq!(message.body_text().unwrap(), "body");
    }

    #[test]
    fn test_parse_broken_multipart() {
        let missing_boundary = "Content-Type: multipart/mixed\r\n\r\n--a\r\n";
        assert!(matches!(
            Message::parse(missing_boundary),
            Err(Error::MissingBoundary)
        ));

        let unterminated = concat!(
            "Content-Type: multipart/mixed; boundary=a\r\n",
            "\r\n",
            "--a\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "never closed",
        );
        assert!(matches!(
            Message::parse(unterminated),
            Err(Error::InvalidMultipart(_))
        ));
    }
}
