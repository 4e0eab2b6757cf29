//! The public error type for the library.
//!
//! Internally, functions use `anyhow` to build up context chains. At the public boundary those
//! errors are tagged with an `ErrorType` so that callers can tell a rejected filter apart from a
//! malformed input file or a cancelled analysis without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The broad category of an `Error`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A filter or grouping referenced a column that is not in the schema allowlist, or used a
    /// known column in a way the schema does not allow.
    Schema,
    /// An input record was missing a required field or had an unparseable value.
    MalformedRecord,
    /// The configuration file could not be loaded or contained invalid values.
    Config,
    /// The analysis was cancelled by the caller.
    Cancelled,
    /// A file could not be read or written.
    Io,
    /// Anything else.
    Internal,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// An error returned from the public API.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    pub(crate) fn schema(message: impl Display) -> Self {
        Self::new(ErrorType::Schema, anyhow::anyhow!("{message}"))
    }

    pub(crate) fn malformed(message: impl Display) -> Self {
        Self::new(ErrorType::MalformedRecord, anyhow::anyhow!("{message}"))
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorType::Cancelled, anyhow::anyhow!("The analysis was cancelled"))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {:?}", self.error_type, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The alternate form prints the whole context chain on one line.
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for Error {
    fn from(inner: anyhow::Error) -> Self {
        Self::new(ErrorType::Internal, inner)
    }
}

/// Converts an internal result into a public `Result` tagged with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
