//! Storage backend trait and implementations.
//!
//! The pipeline only ever talks to the vault through [`StorageBackend`], so
//! the same code runs against the local filesystem and against the in-memory
//! [`MockBackend`] used by tests (behind the `mock` feature).

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for vault storage.
///
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use larder_storage::{StorageBackend, error::Result};
///
/// async fn read_capture(backend: &dyn StorageBackend) -> Result<Option<String>> {
///     let path = Path::new("Inbox/link.txt");
///     if !backend.exists(path).await? {
///         return Ok(None);
///     }
///     let bytes = backend.read(path).await?;
///     Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files under an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream).
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream metadata for every file under an optional prefix, recursively.
    ///
    /// Prefix matching is component based: `Inbox/Arch` does not match
    /// `Inbox/Archive/file.md`. Listing a prefix that does not exist yields an
    /// empty stream rather than an error. Errors for individual entries are
    /// yielded without ending the stream.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file.
    ///
    /// # Notes
    /// - Parent directories are created as needed.
    /// - Readers never observe a partially written file.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Move a file within the same backend.
    ///
    /// # Notes
    /// - Parent directories for the destination are created as needed.
    /// - Never overwrites: returns
    ///   [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) when the
    ///   destination is taken, and
    ///   [`NotFound`](crate::error::ErrorKind::NotFound) when the source is
    ///   missing.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Create a directory and any missing parents. Succeeds if it already
    /// exists.
    async fn create_dir(&self, path: &Path) -> Result<()>;
}
