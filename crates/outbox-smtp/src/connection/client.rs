//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Rejection, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashSet;
use std::marker::PhantomData;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
///
/// Dropping a client in any state closes the underlying connection.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    client_hostname: String,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true if the connection is encrypted.
    fn is_tls(&self) -> bool;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?.success()?;

        // Server hostname is the first word of the greeting
        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(server = %hostname, "SMTP greeting");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            client_hostname: String::new(),
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.client_hostname = client_hostname.to_string();
        self.refresh_extensions().await?;
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS.
    ///
    /// `server_hostname` is checked against the server certificate. EHLO is
    /// repeated afterwards because capabilities may change once encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(mut self, server_hostname: &str) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.send_command(Command::StartTls).await?.success()?;
        self.stream = self.stream.upgrade_to_tls(server_hostname).await?;
        self.refresh_extensions().await?;

        Ok(self)
    }

    /// Authenticates with the best advertised plaintext mechanism.
    ///
    /// Prefers PLAIN and falls back to LOGIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server offers neither, or an
    /// SMTP error if the credentials are refused.
    pub async fn authenticate(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let mechanisms = self.server_info.auth_mechanisms();
        if mechanisms.contains(&AuthMechanism::Plain) {
            self.auth_plain(username, password).await
        } else if mechanisms.contains(&AuthMechanism::Login) {
            self.auth_login(username, password).await
        } else {
            Err(Error::NotSupported("AUTH".into()))
        }
    }

    /// Authenticates using PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        // PLAIN response: \0username\0password
        let credentials = format!("\0{username}\0{password}");

        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials.as_bytes())),
        };
        self.send_command(cmd).await?.success()?;

        tracing::debug!(mechanism = "PLAIN", "Authenticated");
        Ok(self.transition())
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.send_command(cmd)
            .await?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;

        let cmd = Command::AuthResponse {
            response: STANDARD.encode(username.as_bytes()),
        };
        self.send_command(cmd)
            .await?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;

        let cmd = Command::AuthResponse {
            response: STANDARD.encode(password.as_bytes()),
        };
        self.send_command(cmd).await?.success()?;

        tracing::debug!(mechanism = "LOGIN", "Authenticated");
        Ok(self.transition())
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(self, from: Address) -> Result<Client<MailTransaction>> {
        self.start_transaction(from, None).await
    }

    /// Starts a mail transaction for a message of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if the server advertises a smaller
    /// limit, or an error if the MAIL FROM command fails.
    pub async fn mail_from_sized(
        self,
        from: Address,
        size: usize,
    ) -> Result<Client<MailTransaction>> {
        self.start_transaction(from, Some(size)).await
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(self, from: Address) -> Result<Client<MailTransaction>> {
        self.start_transaction(from, None).await
    }

    /// Starts a mail transaction for a message of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if the server advertises a smaller
    /// limit, or an error if the MAIL FROM command fails.
    pub async fn mail_from_sized(
        self,
        from: Address,
        size: usize,
    ) -> Result<Client<MailTransaction>> {
        self.start_transaction(from, Some(size)).await
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded>> {
        self.send_command(Command::RcptTo { to }).await?.success()?;
        Ok(self.transition())
    }

    /// Offers every recipient to the server and keeps going past refusals.
    ///
    /// Returns the client together with the refused recipients.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecipientsRefused`] when no recipient was accepted,
    /// or an I/O or protocol error if the exchange itself fails.
    pub async fn rcpt_to_all(
        mut self,
        recipients: &[Address],
    ) -> Result<(Client<RecipientAdded>, Vec<Rejection>)> {
        if recipients.is_empty() {
            return Err(Error::InvalidState("RCPT TO needs a recipient".into()));
        }

        let mut rejections = Vec::new();
        for to in recipients {
            let reply = self.send_command(Command::RcptTo { to: to.clone() }).await?;
            if !reply.is_success() {
                tracing::debug!(recipient = %to, code = %reply.code, "Recipient refused");
                rejections.push(Rejection::new(
                    to.clone(),
                    reply.code,
                    reply.message_text(),
                ));
            }
        }

        if rejections.len() == recipients.len() {
            return Err(Error::RecipientsRefused(rejections));
        }

        Ok((self.transition(), rejections))
    }

    /// Resets the transaction and returns to connected state.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(self) -> Result<Client<Connected>> {
        self.rset().await
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.send_command(Command::RcptTo { to }).await?.success()?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command fails.
    pub async fn data(mut self) -> Result<Client<Data>> {
        self.send_command(Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;
        Ok(self.transition())
    }

    /// Resets the transaction and returns to connected state.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(self) -> Result<Client<Connected>> {
        self.rset().await
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Message should be RFC 5322 formatted. Line endings are normalized to
    /// CRLF, lines starting with `.` are dot-stuffed and the terminating
    /// `.` line is added.
    ///
    /// Returns the client, ready for another transaction, and the server's
    /// acceptance reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or server rejects it.
    pub async fn send_message(mut self, message: &[u8]) -> Result<(Client<Connected>, Reply)> {
        tracing::debug!(bytes = message.len(), "Sending message data");
        self.stream.write_all(&dot_stuff(message)).await?;

        let reply = read_reply(&mut self.stream).await?.success()?;
        Ok((self.transition(), reply))
    }
}

// Common implementation for all states
impl<S> Client<S> {
    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        tracing::debug!(command = cmd.verb(), "SMTP command");
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        tracing::debug!(code = %reply.code, "SMTP reply");
        Ok(reply)
    }

    async fn refresh_extensions(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: self.client_hostname.clone(),
        };
        let reply = self.send_command(cmd).await?.success()?;

        // First line echoes the server name, the rest are extensions
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Ok(())
    }

    async fn start_transaction(
        mut self,
        from: Address,
        size: Option<usize>,
    ) -> Result<Client<MailTransaction>> {
        // SIZE is only sent to servers that advertise it; a limit of 0 means none
        let size = size.filter(|_| self.server_info.supports_size());
        let limit = self.server_info.max_message_size().filter(|&limit| limit > 0);
        if let Some(size) = size.filter(|&size| limit.is_some_and(|limit| size > limit)) {
            return Err(Error::MessageTooLarge(size));
        }

        self.send_command(Command::MailFrom { from, size })
            .await?
            .success()?;
        Ok(self.transition())
    }

    async fn rset(mut self) -> Result<Client<Connected>> {
        self.send_command(Command::Rset).await?.success()?;
        Ok(self.transition())
    }

    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            client_hostname: self.client_hostname,
            _state: PhantomData,
        }
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        self.send_command(Command::Quit).await?.success()?;
        Ok(())
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

/// Prepares a message for the DATA phase.
///
/// Every line ends in CRLF, lines starting with `.` get an extra `.`, and
/// the `.` terminator line is appended.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.len() + message.len() / 64 + 5);

    let mut lines: Vec<&[u8]> = message.split(|&b| b == b'\n').collect();
    // A trailing newline (or an empty message) leaves an empty last segment
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    for line in lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            buf.push(b'.');
        }
        buf.extend_from_slice(line);
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b".\r\n");
    buf
}
