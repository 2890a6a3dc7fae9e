//! File metadata reported by storage backends.

use std::ffi::OsStr;
use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by storage backends when listing or stat-ing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    /// Final path component, lossily converted. Empty for a root path.
    pub fn file_name(&self) -> String {
        self.path.file_name().map(OsStr::to_string_lossy).unwrap_or_default().into_owned()
    }

    /// Lower-cased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        self.path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lowercased() {
        let info = FileInfo::new("Inbox/Photo.JPG", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.extension().as_deref(), Some("jpg"));
        assert_eq!(info.file_name(), "Photo.JPG");
    }

    #[test]
    fn test_no_extension() {
        let info = FileInfo::new("Inbox/README", 0, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.extension(), None);
    }
}
