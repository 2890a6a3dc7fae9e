//! Error types for the [`archive`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An archive error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A storage backend operation (stat, create, rename) failed.
    #[display("storage error while archiving")]
    Storage,
    /// The file to archive has no usable file name.
    #[display("cannot archive {}: no file name", _0.display())]
    InvalidName(#[error(not(source))] PathBuf),
    /// Every candidate name up to the attempt limit was taken.
    #[display("no free archive name for {}", _0.display())]
    Exhausted(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
