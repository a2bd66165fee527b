//! # outbox-smtp
//!
//! Async SMTP submission client (RFC 5321) used by `outbox` to hand
//! messages to an authenticated relay.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of valid
//!   SMTP state transitions
//! - **Submission dialogue**: EHLO, STARTTLS, AUTH, MAIL FROM, RCPT TO, DATA, RSET, QUIT
//! - **TLS support**: Both implicit TLS (port 465) and STARTTLS, via rustls
//!   with the webpki root store
//! - **Authentication**: PLAIN, with LOGIN as fallback
//! - **Partial delivery**: recipients refused during `RCPT TO` are collected
//!   instead of aborting the transaction
//!
//! ## Quick Start
//!
//! ```ignore
//! use outbox_smtp::{Address, Client};
//! use outbox_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> outbox_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.ehlo("client.example.com").await?;
//!     let client = client.starttls("smtp.example.com").await?;
//!     let client = client.authenticate("user@example.com", "password").await?;
//!
//!     let from = Address::new("user@example.com")?;
//!     let to = [Address::new("recipient@example.com")?];
//!
//!     let client = client.mail_from(from).await?;
//!     let (client, refused) = client.rcpt_to_all(&to).await?;
//!     let client = client.data().await?;
//!
//!     let message = b"Subject: Test\r\n\r\nHello, World!\r\n";
//!     let (client, _reply) = client.send_message(message).await?;
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── authenticate() ───→ Authenticated
//! └──────────────┘                               │
//!        │                                       │
//!        └─── mail_from() ───→ MailTransaction ←─┘
//!                                   │
//!                          rcpt_to_all() ───→ RecipientAdded ─── data() ───→ Data
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, ServerInfo,
    SmtpConnection, SmtpStream,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Rejection, Reply, ReplyCode};
