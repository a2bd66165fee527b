//! The relay-bound sender.

use crate::attachment::Attachment;
use crate::config::{RelayConfig, Security};
use crate::email::Email;
use crate::error::{Error, Result};
use crate::message::compose;
use crate::transport::{Envelope, Session, SmtpTransport, Transport};
use chrono::Local;
use outbox_smtp::Rejection;
use std::fmt;

/// What the relay did with a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients the relay accepted.
    pub accepted: Vec<String>,
    /// Recipients the relay refused; the message went to the rest.
    pub refused: Vec<Rejection>,
}

impl Delivery {
    /// Returns true if every recipient was accepted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.refused.is_empty()
    }
}

/// Sends emails through one authenticated relay.
///
/// Every [`send`](Self::send) opens its own connection, so an `Outbox` can be
/// shared and reused freely.
pub struct Outbox<T = SmtpTransport> {
    username: String,
    password: String,
    relay: RelayConfig,
    transport: T,
}

impl Outbox {
    /// Creates an outbox for `host:port`.
    ///
    /// `username` is also the `From` header and the envelope sender, so it
    /// must be an email address: logins such as `apikey` are refused by
    /// [`send`](Self::send) with [`Error::InvalidAddress`] before the relay
    /// is contacted. With `use_tls` the connection is upgraded with STARTTLS
    /// before logging in.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        use_tls: bool,
    ) -> Self {
        Self::from_config(
            username,
            password,
            RelayConfig::new(host, port, Security::from(use_tls)),
        )
    }

    /// Creates an outbox from a relay configuration.
    ///
    /// As with [`new`](Self::new), `username` doubles as the sender address.
    #[must_use]
    pub fn from_config(
        username: impl Into<String>,
        password: impl Into<String>,
        relay: RelayConfig,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            relay,
            transport: SmtpTransport::new(),
        }
    }
}

impl<T: Transport> Outbox<T> {
    /// Replaces the transport used to reach the relay.
    #[must_use]
    pub fn with_transport<U: Transport>(self, transport: U) -> Outbox<U> {
        Outbox {
            username: self.username,
            password: self.password,
            relay: self.relay,
            transport,
        }
    }

    /// Returns the relay login, also used as sender.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the relay configuration.
    #[must_use]
    pub const fn relay(&self) -> &RelayConfig {
        &self.relay
    }

    /// Sends `email` with `attachments`.
    ///
    /// The message is assembled and every address checked before the relay
    /// is contacted. Nothing is retried; the first error is returned.
    ///
    /// Attachments must be [`Attachment`] values:
    ///
    /// ```compile_fail
    /// # async fn run() -> outbox::Result<()> {
    /// use outbox::{Email, Outbox};
    ///
    /// let outbox = Outbox::new("me@x.com", "secret", "smtp.x.com", 587, true);
    /// let email = Email::new(["a@x.com"], "Hi", "Body text")?;
    /// outbox.send(&email, &["report.pdf"]).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if an attachment can't be read
    /// - [`Error::InvalidAddress`] if the username or a recipient is not a
    ///   usable address
    /// - [`Error::Connection`], [`Error::Tls`] or [`Error::Authentication`]
    ///   if the session can't be set up
    /// - [`Error::RecipientsRefused`] if the relay refuses every recipient
    /// - [`Error::Delivery`] if the relay rejects the message
    pub async fn send(&self, email: &Email, attachments: &[Attachment]) -> Result<Delivery> {
        let message = compose(&self.username, email, attachments, &Local::now())?;
        let wire = message.to_bytes()?;
        let envelope = Envelope::new(&self.username, email.recipients())?;
        tracing::debug!(
            recipients = email.recipients().len(),
            attachments = attachments.len(),
            bytes = wire.len(),
            "Message assembled"
        );

        let session = self.transport.connect(&self.relay).await?;
        let session = if self.relay.security == Security::StartTls {
            session.upgrade_to_tls().await?
        } else {
            session
        };
        let session = session
            .authenticate(&self.username, &self.password)
            .await?;
        let (session, refused) = session.submit(&envelope, &wire).await?;

        if let Err(e) = session.close().await {
            tracing::warn!(?e, "QUIT failed after delivery");
        }

        for rejection in &refused {
            tracing::warn!(%rejection, "Recipient refused");
        }
        let accepted: Vec<String> = email
            .recipients()
            .iter()
            .filter(|to| !refused.iter().any(|r| r.address.as_str() == to.as_str()))
            .cloned()
            .collect();
        tracing::info!(
            accepted = accepted.len(),
            refused = refused.len(),
            "Message sent"
        );

        Ok(Delivery { accepted, refused })
    }

    /// Sends `email` from synchronous code, blocking until done.
    ///
    /// Runs [`send`](Self::send) on a private single-threaded runtime, so it
    /// must not be called from within an async context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the runtime can't be started, otherwise
    /// the same errors as [`send`](Self::send).
    pub fn send_blocking(&self, email: &Email, attachments: &[Attachment]) -> Result<Delivery> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?
            .block_on(self.send(email, attachments))
    }
}

impl<T> fmt::Debug for Outbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}
