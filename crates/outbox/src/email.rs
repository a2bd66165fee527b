//! The email value object.

use crate::error::{Error, Result};

/// A plain-text email addressed to one or more recipients.
///
/// Immutable once built. Recipient addresses are kept as given and only
/// checked when the email is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    recipients: Vec<String>,
    subject: String,
    body: String,
}

impl Email {
    /// Creates an email.
    ///
    /// `recipients` can be any iterable of strings, including `Option`:
    ///
    /// ```
    /// use outbox::Email;
    ///
    /// let email = Email::new(["a@x.com", "b@x.com"], "Hi", "Body text").unwrap();
    /// assert_eq!(email.recipients(), ["a@x.com", "b@x.com"]);
    ///
    /// assert!(Email::new(None::<String>, "Hi", "").is_err());
    /// ```
    ///
    /// Recipients must be strings:
    ///
    /// ```compile_fail
    /// use outbox::Email;
    ///
    /// let email = Email::new([1, 2], "Hi", "Body text");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRecipients`] if `recipients` is empty.
    pub fn new<I, S>(
        recipients: I,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let recipients: Vec<String> = recipients.into_iter().map(Into::into).collect();
        if recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        Ok(Self {
            recipients,
            subject: subject.into(),
            body: body.into(),
        })
    }

    /// Returns the recipients in the order they were given.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Returns the subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the plain-text body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}
