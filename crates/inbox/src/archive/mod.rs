//! Collision-safe relocation into the archive folder.
//!
//! The archive is flat: every file lands directly in the archive folder
//! under its own base name, optionally marked with a suffix
//! ([`DUPE_SUFFIX`], [`ERROR_SUFFIX`]) before the extension. When the name is
//! taken, `-1`, `-2`, … are appended after the suffix:
//!
//! ```text
//! draft.md        → Archive/draft.md
//! draft.md        → Archive/draft-1.md
//! draft.md (dupe) → Archive/draft.dupe.md
//! draft.md (err)  → Archive/draft.error.md, Archive/draft.error-1.md, …
//! ```

pub mod error;

use crate::archive::error::{ErrorKind, Result};
use crate::error::{ErrorKind as InboxErrorKind, Result as InboxResult};
use exn::ResultExt;
use larder_storage::BackendHandle;
use larder_storage::error::ErrorKind as StorageErrorKind;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Marks a file archived because its job was already processed.
pub const DUPE_SUFFIX: &str = ".dupe";
/// Marks a quarantined file.
pub const ERROR_SUFFIX: &str = ".error";

/// Give up after this many taken names.
pub(crate) const MAX_ATTEMPTS: usize = 10_000;

pub struct Archiver {
    backend: BackendHandle,
    folder: PathBuf,
}
impl Archiver {
    pub fn new(backend: BackendHandle, folder: impl Into<PathBuf>) -> Self {
        Self { backend, folder: folder.into() }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Moves `path` into the archive folder, returning where it ended up.
    ///
    /// # Errors
    /// Returns [`Exn<InboxErrorKind::Archive>`](InboxErrorKind::Archive)
    /// raised from an inner [`Exn<ErrorKind>`](ErrorKind).
    pub async fn archive(&self, path: &Path, suffix: Option<&str>) -> InboxResult<PathBuf> {
        self.archive_inner(path, suffix).await.or_raise(|| InboxErrorKind::Archive)
    }

    #[instrument(skip_all, fields(path = %path.display(), suffix = ?suffix))]
    pub(crate) async fn archive_inner(&self, path: &Path, suffix: Option<&str>) -> Result<PathBuf> {
        let Some(name) = path.file_name().map(Path::new) else {
            exn::bail!(ErrorKind::InvalidName(path.to_path_buf()));
        };
        self.backend.create_dir(&self.folder).await.or_raise(|| ErrorKind::Storage)?;

        for attempt in 0..MAX_ATTEMPTS {
            let target = self.folder.join(candidate(name, suffix.unwrap_or_default(), attempt));
            if self.backend.exists(&target).await.or_raise(|| ErrorKind::Storage)? {
                continue;
            }
            match self.backend.rename(path, &target).await {
                Ok(()) => {
                    tracing::info!(archived = %target.display(), "Archived file");
                    return Ok(target);
                },
                // Someone else took the name between the check and the move.
                Err(e) if matches!(&*e, StorageErrorKind::AlreadyExists(_)) => continue,
                Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
            }
        }
        exn::bail!(ErrorKind::Exhausted(path.to_path_buf()))
    }
}

/// `stem + suffix [+ -attempt] [+ .ext]`
pub(crate) fn candidate(name: &Path, suffix: &str, attempt: usize) -> String {
    let stem = name.file_stem().map(OsStr::to_string_lossy).unwrap_or_default();
    let counter = if attempt == 0 { String::new() } else { format!("-{attempt}") };
    match name.extension() {
        Some(ext) => format!("{stem}{suffix}{counter}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}{counter}"),
    }
}

/// Whether a file name carries the quarantine marker, either on an archived
/// original (`draft.error.md`, `draft.error-2.md`) or a note
/// (`draft.error.log.md`).
pub fn is_quarantined(path: &Path) -> bool {
    let marker = ERROR_SUFFIX.trim_start_matches('.');
    let Some(name) = path.file_name().map(OsStr::to_string_lossy) else {
        return false;
    };
    name.split('.').skip(1).any(|segment| {
        segment == marker
            || segment
                .strip_prefix(marker)
                .and_then(|rest| rest.strip_prefix('-'))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    })
}
