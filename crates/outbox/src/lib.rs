//! # outbox
//!
//! Compose an email, attach files and hand it to an authenticated SMTP
//! relay.
//!
//! ## Quick Start
//!
//! ```no_run
//! use outbox::{Attachment, Email, Outbox};
//!
//! # async fn run() -> outbox::Result<()> {
//! let outbox = Outbox::new("me@example.com", "app-password", "smtp.example.com", 587, true);
//!
//! let email = Email::new(["a@example.com", "b@example.com"], "Hi", "Body text")?;
//! let report = Attachment::from_bytes("report.pdf", b"%PDF-1.4...".to_vec());
//!
//! let delivery = outbox.send(&email, &[report]).await?;
//! for rejection in &delivery.refused {
//!     eprintln!("not delivered: {rejection}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Synchronous callers use [`Outbox::send_blocking`] instead.
//!
//! ## Sending
//!
//! [`Outbox::send`] builds a `multipart/mixed` message with the body as its
//! first part and one base64 part per attachment, checks the envelope
//! addresses, then connects, upgrades to TLS if configured, logs in and
//! submits. Any failure is returned as is, nothing is retried. Connections
//! are closed on every path.
//!
//! The relay is reached through the [`Transport`] trait; [`SmtpTransport`]
//! is the default and [`Outbox::with_transport`] swaps it out.
//!
//! ## Logging
//!
//! Progress is reported through `tracing`. The library never installs a
//! subscriber and never logs credentials.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod attachment;
mod config;
mod email;
mod error;
pub mod message;
mod outbox;
pub mod transport;

pub use attachment::Attachment;
pub use config::{RelayConfig, Security};
pub use email::Email;
pub use error::{Error, Result};
pub use message::{add_attachment, compose};
pub use outbox::{Delivery, Outbox};
pub use outbox_smtp::Rejection;
pub use transport::{Envelope, Session, SmtpSession, SmtpTransport, Transport};
