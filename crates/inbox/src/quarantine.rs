//! Failure quarantine: the `.error` archive plus a diagnostic note.

use crate::archive::{Archiver, ERROR_SUFFIX, MAX_ATTEMPTS, candidate};
use crate::job::InboxJob;
use larder_storage::BackendHandle;
use larder_storage::error::Result as StorageResult;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Renders the diagnostic note written next to a quarantined file.
///
/// ```text
/// # Quarantined job
/// reason: quota exceeded
/// job: {
///   "kind": "url",
///   ...
/// }
/// ```
pub fn render_note(reason: &str, job: Option<&InboxJob>) -> String {
    let mut note = format!("# Quarantined job\nreason: {reason}\n");
    if let Some(job) = job
        && let Ok(json) = serde_json::to_string_pretty(job)
    {
        note.push_str("job: ");
        note.push_str(&json);
        note.push('\n');
    }
    note
}

/// `Archive/draft.error.md` (from `draft.md`) → `Archive/draft.error.log.md`.
///
/// Only the original extension is dropped, so `README` archived as
/// `README.error-1` gets `README.error-1.log.md`.
fn note_for_archived(archived: &Path, original: &Path) -> PathBuf {
    let name = archived.file_name().map(OsStr::to_string_lossy).unwrap_or_default();
    let base = match original.extension() {
        Some(ext) => name.strip_suffix(&format!(".{}", ext.to_string_lossy())).unwrap_or(&name).to_string(),
        None => name.into_owned(),
    };
    archived.with_file_name(format!("{base}.log.md"))
}

/// `Inbox/draft.md` → `Inbox/draft.error.log.md`, for when the original
/// could not be moved.
fn note_for_original(original: &Path) -> PathBuf {
    let stem = original.file_stem().map(OsStr::to_string_lossy).unwrap_or_default();
    original.with_file_name(format!("{stem}{ERROR_SUFFIX}.log.md"))
}

/// Writes `body` to `note`, or to `note-1`, `note-2`, … when the name is
/// taken. Existing files are never replaced.
async fn write_note(backend: &BackendHandle, note: &Path, body: &[u8]) -> StorageResult<Option<PathBuf>> {
    let Some(name) = note.file_name().map(Path::new) else {
        return Ok(None);
    };
    for attempt in 0..MAX_ATTEMPTS {
        let target = note.with_file_name(candidate(name, "", attempt));
        if backend.exists(&target).await? {
            continue;
        }
        backend.write(&target, body).await?;
        return Ok(Some(target));
    }
    Ok(None)
}

/// Moves `path` aside with the [`ERROR_SUFFIX`] and writes a note explaining
/// why. Returns the archived path when the move succeeded.
///
/// Never fails: problems along the way are logged and swallowed, since this
/// already runs on the error path.
#[instrument(skip_all, fields(path = %path.display(), reason = %reason))]
pub(crate) async fn quarantine(
    archiver: &Archiver,
    backend: &BackendHandle,
    path: &Path,
    reason: &str,
    job: Option<&InboxJob>,
) -> Option<PathBuf> {
    let archived = match archiver.archive_inner(path, Some(ERROR_SUFFIX)).await {
        Ok(archived) => Some(archived),
        Err(err) => {
            tracing::error!(error = ?err, "Could not move quarantined file into the archive");
            None
        },
    };
    let note = match &archived {
        Some(archived) => note_for_archived(archived, path),
        None => note_for_original(path),
    };
    match write_note(backend, &note, render_note(reason, job).as_bytes()).await {
        Ok(Some(written)) => tracing::debug!(note = %written.display(), "Wrote quarantine note"),
        Ok(None) => tracing::error!(note = %note.display(), "No free name for quarantine note"),
        Err(err) => tracing::error!(note = %note.display(), error = ?err, "Could not write quarantine note"),
    }
    archived
}
