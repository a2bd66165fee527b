//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore},
};

/// Byte stream an SMTP session can run over.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Debug> Io for T {}

/// SMTP stream (plain or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Unencrypted connection.
    Plain(BufReader<Box<dyn Io>>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream<Box<dyn Io>>>>),
}

impl SmtpStream {
    /// Wraps an already connected byte stream.
    #[must_use]
    pub fn from_io(io: impl Io + 'static) -> Self {
        let io: Box<dyn Io> = Box::new(io);
        Self::Plain(BufReader::new(io))
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads a line from the stream, without the line terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] at end of stream, or an I/O error
    /// if the read fails.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Plain(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a plain stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the TLS
    /// handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let io = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };
        handshake(io, hostname).await
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    Ok(SmtpStream::from_io(stream))
}

/// Connects to an SMTP server over TLS (implicit TLS on port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let stream = TcpStream::connect((hostname, port)).await?;
    handshake(Box::new(stream), hostname).await
}

async fn handshake(io: Box<dyn Io>, hostname: &str) -> Result<SmtpStream> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;

    let tls_stream = create_tls_connector()
        .connect(server_name, io)
        .await
        .map_err(handshake_error)?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

/// Surfaces the rustls error hidden inside a failed handshake.
fn handshake_error(err: io::Error) -> Error {
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<rustls::Error>() {
            Ok(tls) => Error::Tls(*tls),
            Err(other) => Error::Io(io::Error::new(kind, other)),
        },
        None => Error::Io(io::Error::from(kind)),
    }
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
