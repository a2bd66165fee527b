//! Connection to the relay.
//!
//! [`Outbox`](crate::Outbox) drives a [`Session`] through a fixed sequence:
//! optional TLS upgrade, authentication, submission, close. Each step
//! consumes the session and hands back the next one, so a session that hits
//! an error is dropped and its connection released on the spot.

use crate::config::{RelayConfig, Security};
use crate::error::{Error, Result};
use outbox_smtp::connection::{connect, connect_tls};
use outbox_smtp::{Address, Authenticated, Client, Connected, Rejection};
use std::future::Future;

/// Sender and recipients handed to the relay, separate from the headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    recipients: Vec<Address>,
}

impl Envelope {
    /// Validates the sender and recipients as envelope addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for the first unusable address and
    /// [`Error::NoRecipients`] if there are no recipients.
    pub fn new<S: AsRef<str>>(from: &str, recipients: &[S]) -> Result<Self> {
        if recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        let from = parse_address(from)?;
        let recipients = recipients
            .iter()
            .map(|to| parse_address(to.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { from, recipients })
    }

    /// Returns the envelope sender.
    #[must_use]
    pub const fn from(&self) -> &Address {
        &self.from
    }

    /// Returns the envelope recipients.
    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }
}

fn parse_address(addr: &str) -> Result<Address> {
    Address::new(addr).map_err(|e| match e {
        outbox_smtp::Error::InvalidAddress(msg) => Error::InvalidAddress(msg),
        other => Error::InvalidAddress(other.to_string()),
    })
}

/// Opens sessions to a relay.
pub trait Transport: Send + Sync {
    /// Session type produced by [`connect`](Self::connect).
    type Session: Session;

    /// Connects to the relay and completes the greeting.
    ///
    /// With [`Security::Tls`] the connection is encrypted from the start.
    fn connect(
        &self,
        relay: &RelayConfig,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// One open connection to a relay.
pub trait Session: Sized + Send {
    /// Upgrades the connection to TLS.
    fn upgrade_to_tls(self) -> impl Future<Output = Result<Self>> + Send;

    /// Logs in with the relay credentials.
    fn authenticate(
        self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Self>> + Send;

    /// Submits a rendered message.
    ///
    /// Returns the session and the recipients the relay refused. Refusing
    /// every recipient is an error.
    fn submit(
        self,
        envelope: &Envelope,
        message: &[u8],
    ) -> impl Future<Output = Result<(Self, Vec<Rejection>)>> + Send;

    /// Ends the session politely.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// [`Transport`] speaking SMTP over TCP.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    client_hostname: String,
}

impl SmtpTransport {
    /// Creates a transport that introduces itself as `localhost`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client_hostname("localhost")
    }

    /// Creates a transport that introduces itself as `hostname` in EHLO.
    #[must_use]
    pub fn with_client_hostname(hostname: impl Into<String>) -> Self {
        Self {
            client_hostname: hostname.into(),
        }
    }
}

impl Default for SmtpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SmtpTransport {
    type Session = SmtpSession;

    async fn connect(&self, relay: &RelayConfig) -> Result<SmtpSession> {
        tracing::debug!(
            host = %relay.host,
            port = relay.port,
            security = ?relay.security,
            "Connecting to relay"
        );

        let stream = match relay.security {
            Security::Tls => connect_tls(&relay.host, relay.port).await,
            Security::StartTls | Security::None => connect(&relay.host, relay.port).await,
        }
        .map_err(connection_error)?;

        let client = Client::from_stream(stream)
            .await
            .map_err(connection_error)?
            .ehlo(&self.client_hostname)
            .await
            .map_err(connection_error)?;

        Ok(SmtpSession {
            host: relay.host.clone(),
            state: State::Connected(client),
        })
    }
}

fn connection_error(err: outbox_smtp::Error) -> Error {
    match err {
        outbox_smtp::Error::Tls(_) => Error::Tls(err),
        other => Error::Connection(other),
    }
}

fn submission_error(err: outbox_smtp::Error) -> Error {
    match err {
        outbox_smtp::Error::RecipientsRefused(rejections) => Error::RecipientsRefused(rejections),
        other => Error::Delivery(other),
    }
}

/// An SMTP connection opened by [`SmtpTransport`].
#[derive(Debug)]
pub struct SmtpSession {
    host: String,
    state: State,
}

#[derive(Debug)]
enum State {
    Connected(Client<Connected>),
    Authenticated(Client<Authenticated>),
}

impl Session for SmtpSession {
    async fn upgrade_to_tls(self) -> Result<Self> {
        let State::Connected(client) = self.state else {
            return Err(Error::Tls(outbox_smtp::Error::InvalidState(
                "STARTTLS after authentication".into(),
            )));
        };

        let client = client.starttls(&self.host).await.map_err(Error::Tls)?;
        Ok(Self {
            host: self.host,
            state: State::Connected(client),
        })
    }

    async fn authenticate(self, username: &str, password: &str) -> Result<Self> {
        let client = match self.state {
            State::Connected(client) => client,
            State::Authenticated(_) => return Ok(self),
        };

        let client = client
            .authenticate(username, password)
            .await
            .map_err(Error::Authentication)?;
        Ok(Self {
            host: self.host,
            state: State::Authenticated(client),
        })
    }

    async fn submit(
        self,
        envelope: &Envelope,
        message: &[u8],
    ) -> Result<(Self, Vec<Rejection>)> {
        let from = envelope.from().clone();
        let transaction = match self.state {
            State::Connected(client) => client.mail_from_sized(from, message.len()).await,
            State::Authenticated(client) => client.mail_from_sized(from, message.len()).await,
        }
        .map_err(submission_error)?;

        let (client, refused) = transaction
            .rcpt_to_all(envelope.recipients())
            .await
            .map_err(submission_error)?;

        let (client, reply) = client
            .data()
            .await
            .map_err(submission_error)?
            .send_message(message)
            .await
            .map_err(submission_error)?;
        tracing::debug!(reply = %reply.message_text(), "Relay accepted message");

        Ok((
            Self {
                host: self.host,
                state: State::Connected(client),
            },
            refused,
        ))
    }

    async fn close(self) -> Result<()> {
        let quit = match self.state {
            State::Connected(client) => client.quit().await,
            State::Authenticated(client) => client.quit().await,
        };
        quit.map_err(Error::Connection)
    }
}
