//! Turns an [`Email`] and its attachments into a MIME message.

use crate::attachment::Attachment;
use crate::email::Email;
use crate::error::Result;
use chrono::{DateTime, TimeZone};
use outbox_mime::{Message, MessageBuilder};
use std::fmt;

/// Assembles the `multipart/mixed` message for `email`.
///
/// `from` fills the `From` header and `date` the `Date` header. The body
/// becomes the first part, followed by one part per attachment in order.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if an attachment can't be read.
pub fn compose<Tz>(
    from: &str,
    email: &Email,
    attachments: &[Attachment],
    date: &DateTime<Tz>,
) -> Result<Message>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let builder = MessageBuilder::new()
        .from(from)
        .to(email.recipients())
        .date(date)
        .subject(email.subject())
        .text_body(email.body());

    attachments
        .iter()
        .try_fold(builder, add_attachment)
        .map(MessageBuilder::build)
}

/// Adds `attachment` to `builder` as a base64 `application/octet-stream`
/// part named after the attachment's file name.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if the attachment can't be read.
pub fn add_attachment(builder: MessageBuilder, attachment: &Attachment) -> Result<MessageBuilder> {
    let data = attachment.read()?;
    Ok(builder.binary_attachment(attachment.file_name(), &data))
}
