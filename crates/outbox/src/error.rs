//! Error types for composing and sending mail.

use outbox_smtp::Rejection;
use thiserror::Error;

/// Errors that can occur while building or sending an email.
#[derive(Debug, Error)]
pub enum Error {
    /// An email was created without recipients.
    #[error("At least one recipient required")]
    NoRecipients,

    /// An attachment was given both a file path and raw bytes.
    #[error("Attachment file path and raw bytes are mutually exclusive")]
    ConflictingSource,

    /// An attachment was given neither a file path nor raw bytes.
    #[error("One of attachment file path or raw bytes must be set")]
    MissingSource,

    /// Reading an attachment file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sender or a recipient is not a usable envelope address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The message could not be rendered.
    #[error("MIME error: {0}")]
    Mime(#[from] outbox_mime::Error),

    /// The relay could not be reached or greeted.
    #[error("Connection failed: {0}")]
    Connection(#[source] outbox_smtp::Error),

    /// TLS negotiation with the relay failed.
    #[error("TLS negotiation failed: {0}")]
    Tls(#[source] outbox_smtp::Error),

    /// The relay refused the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] outbox_smtp::Error),

    /// The relay refused every recipient.
    #[error("All recipients were refused: {}", format_rejections(.0))]
    RecipientsRefused(Vec<Rejection>),

    /// The relay rejected the message.
    #[error("Delivery failed: {0}")]
    Delivery(#[source] outbox_smtp::Error),

    /// The runtime backing a blocking send could not be started.
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl Error {
    /// Returns true if the error was raised while checking caller input,
    /// before any connection was attempted.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoRecipients
                | Self::ConflictingSource
                | Self::MissingSource
                | Self::InvalidAddress(_)
        )
    }

    /// Returns true if the error came from talking to the relay.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Tls(_)
                | Self::Authentication(_)
                | Self::RecipientsRefused(_)
                | Self::Delivery(_)
        )
    }
}

fn format_rejections(rejections: &[Rejection]) -> String {
    rejections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
