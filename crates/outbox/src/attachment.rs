//! The attachment value object.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where the attachment bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    File(PathBuf),
    Raw(Vec<u8>),
}

/// A named binary payload sent alongside an email.
///
/// A file-backed attachment checks that its file exists when it is created
/// and reads it again on every [`read`](Self::read). Nothing stops the file
/// from being removed or replaced in between: `read` then fails with an I/O
/// error or returns the new contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    name: String,
    source: Source,
}

impl Attachment {
    /// Creates an attachment from exactly one of a file path or raw bytes.
    ///
    /// An empty `filepath` counts as not given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConflictingSource`] if both are given,
    /// [`Error::MissingSource`] if neither is, and [`Error::Io`] if `filepath`
    /// is not an existing regular file.
    pub fn new(
        name: impl Into<String>,
        filepath: Option<impl Into<PathBuf>>,
        raw: Option<impl Into<Vec<u8>>>,
    ) -> Result<Self> {
        let filepath = filepath
            .map(Into::into)
            .filter(|path: &PathBuf| !path.as_os_str().is_empty());
        match (filepath, raw) {
            (Some(_), Some(_)) => Err(Error::ConflictingSource),
            (None, None) => Err(Error::MissingSource),
            (Some(path), None) => Self::from_file(name, path),
            (None, Some(raw)) => Ok(Self::from_bytes(name, raw)),
        }
    }

    /// Creates an attachment backed by a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `path` is not an existing regular file.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("File does not exist: {}", path.display()),
            )));
        }

        Ok(Self {
            name: name.into(),
            source: Source::File(path),
        })
    }

    /// Creates an attachment from bytes held in memory.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: Source::Raw(raw.into()),
        }
    }

    /// Returns the name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file name used on the wire: `name` without any
    /// directory components.
    #[must_use]
    pub fn file_name(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or(&self.name)
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Raw(_) => None,
        }
    }

    /// Returns the attachment bytes.
    ///
    /// Raw bytes are borrowed as is. A file is read in full on each call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file can no longer be read.
    pub fn read(&self) -> Result<Cow<'_, [u8]>> {
        match &self.source {
            Source::Raw(bytes) => Ok(Cow::Borrowed(bytes)),
            Source::File(path) => Ok(Cow::Owned(fs::read(path)?)),
        }
    }
}
