//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a map behind a [`RwLock`], so all trait methods can
/// operate on `&self`. Writes and renames into a path registered with
/// [`fail_writes_to`](Self::fail_writes_to) fail, which lets tests exercise
/// the error-handling paths of callers.
///
/// # Examples
///
/// ```
/// use larder_storage::{StorageBackend, backend::MockBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("Inbox/link.txt", "https://example.com/r")]);
/// assert!(backend.exists(Path::new("Inbox/link.txt")).await.unwrap());
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    failing: std::sync::Mutex<HashSet<PathBuf>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation: broken test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut map = BTreeMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            failing: std::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent write or rename *into* `path` fail.
    pub fn fail_writes_to(&self, path: impl AsRef<Path>) {
        if let Ok(path) = validate_path(path) {
            self.failing.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(path);
        }
    }

    /// Every stored path, sorted.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.storage.read().await.keys().cloned().collect()
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if failing.iter().any(|f| path.starts_with(f)) {
            exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        match guard.get(&path) {
            Some((_, data)) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.check_writable(&path)?;
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        match self.storage.write().await.remove(&path) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        self.check_writable(&to)?;
        let mut guard = self.storage.write().await;
        if guard.contains_key(&to) {
            exn::bail!(ErrorKind::AlreadyExists(to));
        }
        match guard.remove(&from) {
            Some(entry) => {
                guard.insert(to, entry);
                Ok(())
            },
            None => exn::bail!(ErrorKind::NotFound(from)),
        }
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        match guard.get(&path) {
            Some((modified, data)) => Ok(FileInfo::new(path.clone(), data.len() as u64, *modified)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        // Directories are implicit in a flat map.
        validate_path(path).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rename_refuses_to_overwrite() {
        let backend = MockBackend::with_files([("a.txt", "a"), ("b.txt", "b")]);
        let err = backend.rename(Path::new("a.txt"), Path::new("b.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        backend.rename(Path::new("a.txt"), Path::new("c/a.txt")).await.unwrap();
        assert_eq!(backend.paths().await, vec![PathBuf::from("b.txt"), PathBuf::from("c/a.txt")]);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let backend = MockBackend::default();
        backend.fail_writes_to("Archive");
        assert!(backend.write(Path::new("Archive/x.md"), b"x").await.is_err());
        assert!(backend.write(Path::new("Inbox/x.md"), b"x").await.is_ok());
        assert!(backend.rename(Path::new("Inbox/x.md"), Path::new("Archive/x.md")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_prefix_is_component_based() {
        let backend = MockBackend::with_files([("Inbox/a.txt", "a"), ("Inboxes/b.txt", "b")]);
        let files = backend.list(Some(Path::new("Inbox"))).await.unwrap();
        assert_eq!(files.len(), 1);
    }
}
