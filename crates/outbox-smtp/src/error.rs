//! Error types for SMTP operations.

use crate::types::Rejection;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Every recipient of the transaction was refused.
    #[error("All recipients were refused: {}", format_rejections(.0))]
    RecipientsRefused(Vec<Rejection>),

    /// Message too large.
    #[error("Message exceeds size limit: {0} bytes")]
    MessageTooLarge(usize),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns the SMTP reply code carried by this error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::SmtpError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }
}

fn format_rejections(rejections: &[Rejection]) -> String {
    rejections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Address, ReplyCode};

    #[test]
    fn classifies_reply_codes() {
        let err = Error::smtp_error(550, "mailbox unavailable");
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.code(), Some(550));

        let err = Error::smtp_error(451, "try later");
        assert!(err.is_transient());
        assert!(!Error::ConnectionClosed.is_permanent());
        assert_eq!(Error::ConnectionClosed.code(), None);
    }

    #[test]
    fn displays_every_refusal() {
        let err = Error::RecipientsRefused(vec![
            Rejection::new(
                Address::new("a@x.com").unwrap(),
                ReplyCode::MAILBOX_UNAVAILABLE,
                "no such user",
            ),
            Rejection::new(
                Address::new("b@x.com").unwrap(),
                ReplyCode::MAILBOX_BUSY,
                "busy",
            ),
        ]);
        assert_eq!(
            err.to_string(),
            "All recipients were refused: a@x.com (550 no such user); b@x.com (450 busy)"
        );
    }
}
