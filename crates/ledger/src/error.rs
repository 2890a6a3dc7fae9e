//! Ledger Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A ledger error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading or writing the persisted snapshot failed.
    #[display("ledger storage error")]
    Storage,
    /// The persisted snapshot could not be decoded.
    #[display("invalid ledger data")]
    InvalidData,
    /// The snapshot could not be encoded.
    #[display("ledger serialization error")]
    Serialization,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
