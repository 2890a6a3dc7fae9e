use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Terminal outcome recorded for a job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// A document was written for this identity.
    Success,
    /// The job failed and its file was quarantined.
    Error,
    /// The job was recognized as a duplicate of an existing document.
    Skipped,
}
impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}
impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the ledger; persisted as
/// `{"key", "status", "processedAt", "detail"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub key: String,
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
    #[serde(default)]
    pub detail: Option<String>,
}
