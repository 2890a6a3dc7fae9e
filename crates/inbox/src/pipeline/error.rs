//! Error types for the [`pipeline`](super) module.
//!
//! These never leave [`Pipeline::process_file`](super::Pipeline::process_file):
//! every one of them ends in quarantine, and its [`Display`] output is the
//! reason recorded in the ledger and written into the quarantine note.

use derive_more::{Display, Error};

/// A job failure with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline steps.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file could not be classified or read as a job.
    #[display("{_0}")]
    Build(#[error(not(source))] String),
    /// The extractor rejected the job.
    #[display("{_0}")]
    Extraction(#[error(not(source))] String),
    /// The writer rejected the recipe.
    #[display("{_0}")]
    Write(#[error(not(source))] String),
    /// The success could not be made durable.
    #[display("could not record success in the ledger")]
    Ledger,
    /// The file could not be inspected at all.
    #[display("could not inspect file")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Extraction(_) | Self::Ledger | Self::Storage)
    }
}
