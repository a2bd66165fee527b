//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header encoding.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum line length for encoded bodies (RFC 2045).
pub const MAX_LINE_LENGTH: usize = 76;

/// Raw bytes carried by a single RFC 2047 encoded word.
///
/// 45 bytes become 60 base64 characters, which keeps `=?utf-8?B?...?=`
/// under the 75 character limit.
const ENCODED_WORD_CHUNK: usize = 45;

/// Longest run without spaces left unencoded in a header value, so that
/// the header line can be folded within the 998 octet limit (RFC 5322).
pub const MAX_PLAIN_WORD: usize = 900;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-terminated lines of at most
/// [`MAX_LINE_LENGTH`] characters, as required for MIME bodies.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);

    let mut start = 0;
    while start < encoded.len() {
        let end = (start + MAX_LINE_LENGTH).min(encoded.len());
        if start > 0 {
            result.push_str("\r\n");
        }
        // Base64 output is ASCII, so byte offsets are char boundaries
        result.push_str(&encoded[start..end]);
        start = end;
    }

    result
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input are kept as CRLF hard breaks; long lines get
/// soft breaks. Trailing whitespace on a line is always encoded.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::new();

    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            result.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_quoted_printable_line(line.as_bytes(), &mut result);
    }

    result
}

fn encode_quoted_printable_line(line: &[u8], result: &mut String) {
    let mut line_length = 0;

    for (pos, byte) in line.iter().enumerate() {
        let is_last = pos + 1 == line.len();
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !is_last,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Soft line break, leaving room for the trailing '='
        if line_length + width > MAX_LINE_LENGTH - 1 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            result.push(char::from(*byte));
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
    }
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences or
/// does not decode to UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    String::from_utf8(decode_quoted_printable_bytes(text)?).map_err(Into::into)
}

/// Decodes Quoted-Printable text into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable_bytes(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let byte = bytes[pos];
        if byte != b'=' {
            result.push(byte);
            pos += 1;
            continue;
        }

        match &bytes[pos + 1..] {
            // Soft line break
            [b'\r', b'\n', ..] => pos += 3,
            [b'\n', ..] => pos += 2,
            [high, low, ..] => {
                let hex = [*high, *low];
                let value = std::str::from_utf8(&hex)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| {
                        Error::InvalidEncoding(format!(
                            "Invalid hex escape: ={}",
                            String::from_utf8_lossy(&hex)
                        ))
                    })?;
                result.push(value);
                pos += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Format: `=?charset?B?encoded-text?=`. Printable ASCII is returned
/// unchanged unless it contains `=?` or a run without spaces longer than
/// [`MAX_PLAIN_WORD`]. Long values are split into several encoded words
/// joined by folding whitespace.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    let plain = text.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
        && !text.contains("=?")
        && text.split(' ').all(|word| word.len() <= MAX_PLAIN_WORD);
    if plain {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())));
    }

    words.join("\r\n ")
}

/// Decodes an RFC 2047 encoded header value.
///
/// Text outside encoded words is kept as is; whitespace between two
/// adjacent encoded words is dropped.
///
/// # Errors
///
/// Returns an error if an encoded word uses an unknown encoding or does
/// not decode to UTF-8.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut result = String::new();
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);

        if let Some((decoded, consumed)) = decode_encoded_word(candidate)? {
            if !(after_word && before.trim().is_empty()) {
                result.push_str(before);
            }
            result.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            result.push_str(before);
            result.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    result.push_str(rest);
    Ok(result)
}

/// Encodes a MIME parameter value per RFC 2231: `charset''value` with
/// every byte outside `attr-char` percent-encoded.
#[must_use]
pub fn encode_rfc2231(value: &str, charset: &str) -> String {
    let mut result = format!("{charset}''");
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            result.push(char::from(byte));
        } else {
            let _ = write!(result, "%{byte:02X}");
        }
    }
    result
}

/// Decodes an RFC 2231 `charset'language'value` parameter.
///
/// # Errors
///
/// Returns an error if the value is not in extended form, the charset is
/// not UTF-8 or ASCII, or a percent escape is malformed.
pub fn decode_rfc2231(value: &str) -> Result<String> {
    let mut fields = value.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(Error::InvalidEncoding(format!(
            "Not an extended parameter: {value}"
        )));
    };
    if !(charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("us-ascii")) {
        return Err(Error::InvalidEncoding(format!(
            "Unsupported charset: {charset}"
        )));
    }

    let mut bytes = Vec::with_capacity(encoded.len());
    let mut rest = encoded.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let hex = tail
                .get(..2)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| Error::InvalidEncoding(format!("Bad percent escape in {value}")))?;
            bytes.push(hex);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }

    Ok(String::from_utf8(bytes)?)
}

/// Decodes one encoded word at the start of `text`, returning the decoded
/// value and the number of bytes consumed.
fn decode_encoded_word(text: &str) -> Result<Option<(String, usize)>> {
    let Some(inner) = text.strip_prefix("=?") else {
        return Ok(None);
    };

    let mut fields = inner.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(tail)) = (fields.next(), fields.next(), fields.next())
    else {
        return Ok(None);
    };
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return Ok(None);
    }
    let Some(end) = tail.find("?=") else {
        return Ok(None);
    };

    let encoded = &tail[..end];
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded)?,
        "Q" => decode_quoted_printable_bytes(&encoded.replace('_', " "))?,
        _ => {
            return Err(Error::InvalidEncoding(format!(
                "Unknown encoding: {encoding}"
            )));
        }
    };

    Ok(Some((String::from_utf8(bytes)?, consumed)))
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_wrapped_short_input_is_single_line() {
        assert_eq!(encode_base64_wrapped(b"%PDF-1.4"), "JVBERi0xLjQ=");
        assert_eq!(encode_base64_wrapped(b""), "");
    }

    #[test]
    fn test_base64_wrapped_splits_at_76() {
        let data = vec![0u8; 120];
        let encoded = encode_base64_wrapped(&data);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
        assert_eq!(lines[2].len(), 8);
    }

    proptest! {
        #[test]
        fn base64_wrapped_lines_stay_within_limit(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = encode_base64_wrapped(&data);
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= MAX_LINE_LENGTH);
            }
            let joined: String = encoded.split("\r\n").collect();
            prop_assert_eq!(decode_base64(&joined).unwrap(), data);
        }
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!");
        assert!(encoded.contains("=C3=A9"));
    }

    #[test]
    fn test_quoted_printable_keeps_line_breaks() {
        assert_eq!(
            encode_quoted_printable("caf\u{e9}\nsecond line"),
            "caf=C3=A9\r\nsecond line"
        );
        assert_eq!(encode_quoted_printable("a\r\nb"), "a\r\nb");
    }

    #[test]
    fn test_quoted_printable_trailing_space_encoded() {
        assert_eq!(encode_quoted_printable("end \nnext"), "end=20\r\nnext");
    }

    #[test]
    fn test_quoted_printable_soft_breaks_long_lines() {
        let text = "é".repeat(40);
        let encoded = encode_quoted_printable(&text);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(
            decode_quoted_printable("Hello, World!").unwrap(),
            "Hello, World!"
        );
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(
            decode_quoted_printable("Hello=\r\nWorld").unwrap(),
            "HelloWorld"
        );
        assert_eq!(decode_quoted_printable("Hello=\nWorld").unwrap(), "HelloWorld");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable("bad=ZZ").is_err());
        assert!(decode_quoted_printable("cut=4").is_err());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");

        let encoded = encode_rfc2047("Héllo", "utf-8");
        assert_eq!(encoded, "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_rfc2047_encode_long_value_splits_words() {
        let subject = "Rapport trimestriel é".repeat(5);
        let encoded = encode_rfc2047(&subject, "utf-8");
        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);
        for word in &words {
            assert!(word.len() <= 75, "encoded word too long: {word}");
        }
        assert_eq!(decode_rfc2047(&words.join(" ")).unwrap(), subject);
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_rfc2047_quoted_printable() {
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo?=").unwrap(), "Héllo");
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?two_words?=").unwrap(),
            "two words"
        );
    }

    #[test]
    fn test_rfc2047_mixed_text() {
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?SMOpbGxv?= there").unwrap(),
            "Re: Héllo there"
        );
        assert_eq!(decode_rfc2047("what =? is this").unwrap(), "what =? is this");
    }

    #[test]
    fn test_rfc2047_unknown_encoding() {
        assert!(decode_rfc2047("=?utf-8?X?abc?=").is_err());
    }

    #[test]
    fn test_rfc2047_plain_ascii_with_specials() {
        assert_eq!(encode_rfc2047("50% off? a=b", "utf-8"), "50% off? a=b");
        assert!(encode_rfc2047("looks =?like?= a word", "utf-8").starts_with("=?utf-8?B?"));
    }

    #[test]
    fn test_rfc2047_encodes_overlong_ascii_run() {
        let run = "s".repeat(MAX_PLAIN_WORD + 1);
        let encoded = encode_rfc2047(&run, "utf-8");
        assert!(encoded.split("\r\n ").all(|word| word.len() <= 75));
        assert_eq!(decode_rfc2047(&encoded.replace("\r\n", "")).unwrap(), run);

        let fits = "s".repeat(MAX_PLAIN_WORD);
        assert_eq!(encode_rfc2047(&fits, "utf-8"), fits);
    }

    #[test]
    fn test_rfc2231_encode() {
        assert_eq!(encode_rfc2231("résumé.txt", "utf-8"), "utf-8''r%C3%A9sum%C3%A9.txt");
        assert_eq!(encode_rfc2231("a b;c.pdf", "utf-8"), "utf-8''a%20b%3Bc.pdf");
    }

    #[test]
    fn test_rfc2231_decode() {
        assert_eq!(
            decode_rfc2231("utf-8''r%C3%A9sum%C3%A9.txt").unwrap(),
            "résumé.txt"
        );
        assert_eq!(decode_rfc2231("UTF-8'en'plain.txt").unwrap(), "plain.txt");
        assert!(decode_rfc2231("no-quotes").is_err());
        assert!(decode_rfc2231("iso-8859-1''caf%E9").is_err());
        assert!(decode_rfc2231("utf-8''cut%4").is_err());
    }
}
