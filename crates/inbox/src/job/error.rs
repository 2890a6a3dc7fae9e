//! Error types for the [`job`](super) module.
//!
//! Every variant except [`Storage`](ErrorKind::Storage) is a classification
//! failure: the file itself is unusable and retrying will not help.

use derive_more::{Display, Error};

/// A job construction error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for job construction.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No job shape is registered for the file extension.
    #[display("unsupported file type: {_0}")]
    UnsupportedType(#[error(not(source))] String),
    /// A text capture with nothing but whitespace in it.
    #[display("empty job")]
    EmptyJob,
    /// A manifest that does not describe a usable job.
    #[display("invalid job: {_0}")]
    InvalidJob(#[error(not(source))] String),
    /// The file (or a manifest's sibling) could not be read.
    #[display("could not read job file")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
