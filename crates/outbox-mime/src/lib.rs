//! # outbox-mime
//!
//! MIME message generation and parsing for outgoing email.
//!
//! ## Features
//!
//! - **Message generation**: `multipart/mixed` messages with a plain-text
//!   body and binary attachments
//! - **Message parsing**: parse a rendered message back into headers and parts
//! - **Encoding/Decoding**: Base64, Quoted-Printable, RFC 2047 header encoding
//! - **Ordered headers**: headers render in the order they were added
//!
//! ## Quick Start
//!
//! ### Building Messages
//!
//! ```ignore
//! use outbox_mime::MessageBuilder;
//!
//! let message = MessageBuilder::new()
//!     .from("sender@example.com")
//!     .to(["a@example.com", "b@example.com"])
//!     .subject("Quarterly report")
//!     .text_body("Please find the report attached.")
//!     .binary_attachment("report.pdf", &pdf_bytes)
//!     .build();
//!
//! let wire = message.to_bytes()?;
//! ```
//!
//! ### Parsing Messages
//!
//! ```ignore
//! use outbox_mime::Message;
//!
//! let message = Message::parse(&raw)?;
//! println!("Body: {}", message.text_part()?);
//! for part in message.attachments() {
//!     println!("{:?}: {} bytes", part.filename(), part.decode_body()?.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use builder::{MessageBuilder, attachment_part, text_part};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
