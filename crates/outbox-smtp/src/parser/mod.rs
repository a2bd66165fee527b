//! SMTP response parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// Every line must carry the same code.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code = reply_code(first)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if reply_code(line)? != code {
            return Err(Error::Protocol(format!(
                "Mismatched code in multi-line reply: {line}"
            )));
        }
        // Skip code and separator (e.g., "250-" or "250 ")
        message.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply::new(code, message))
}

fn reply_code(line: &str) -> Result<ReplyCode> {
    let code_str = line
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {line}")))?;

    if !code_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Protocol(format!("Invalid reply code: {code_str}")));
    }

    match line.as_bytes().get(3) {
        None | Some(b' ' | b'-') => {}
        Some(_) => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
    }

    code_str
        .parse::<u16>()
        .map(ReplyCode::new)
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code_str}")))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
/// A bare three-digit code also ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(b) => *b == b' ',
        None => line.len() == 3,
    }
}
