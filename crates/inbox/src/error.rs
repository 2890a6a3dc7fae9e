//! Inbox Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Submodules with their own failure domain ([`job`],
//! [`archive`]) define their own kinds; public entry points raise them into
//! the crate-level [`ErrorKind`].
//!
//! [`job`]: crate::job
//! [`archive`]: crate::archive

use derive_more::{Display, Error};

/// An inbox error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for inbox operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A file could not be turned into a job.
    #[display("could not build job")]
    Build,
    /// A file could not be moved into the archive.
    #[display("could not archive file")]
    Archive,
    /// The inbox could not be listed during a scan.
    #[display("could not list inbox")]
    Scan,
    /// The ledger could not be loaded.
    #[display("ledger unavailable")]
    Ledger,
    /// A configured folder is not a valid vault-relative path.
    #[display("invalid pipeline settings")]
    Settings,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Scan | Self::Ledger)
    }
}
