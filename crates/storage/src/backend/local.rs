//! Local filesystem storage backend.
//!
//! Files live under a root directory (the vault) and are accessed through
//! `tokio::fs`. Writes go through a temporary file in the destination folder
//! that is persisted over the target, so readers never see half a ledger.

use crate::backend::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use larder_storage::backend::LocalBackend;
///
/// # fn example() -> larder_storage::error::Result<()> {
/// let backend = LocalBackend::new("vault", "/home/me/Recipes")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// [`InvalidPath`](ErrorKind::InvalidPath) if `root` is relative or is
    /// an existing non-directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup, not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Absolute root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path.as_ref())?))
    }

    /// Convert an absolute path below the root back to a storage path.
    pub fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{}` is not within root `{}`", absolute.display(), self.root.display()))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: &Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Keeps the `?` operator usable for a single directory entry; the
    /// stream loop itself can only yield.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // Descend into parents of the prefix as well as its children.
            let on_the_way = prefix.is_none_or(|pfx| pfx.starts_with(&relative) || relative.starts_with(pfx));
            return Ok(if on_the_way { WalkEntry::Descend(path) } else { WalkEntry::Skip });
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, &metadata)?));
        }
        // Broken symlinks, sockets and friends are silently dropped.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A folder that doesn't exist (yet) is an empty folder.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue 'dirs,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    },
                };
                loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(exn::Exn::from(Self::map_io_error(e, &current)));
                            break;
                        },
                    };
                    match self.process_entry(entry, prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        let parent = abs_path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).await.map_err(|e| Self::map_io_error(e, path))?;
        let data = data.to_vec();
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&parent)?;
            tmp.write_all(&data)?;
            tmp.as_file_mut().sync_all()?;
            tmp.persist(&abs_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .or_raise(|| ErrorKind::BackendError(format!("write task for `{}` did not complete", path.display())))?;
        Ok(written.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        // Check-then-rename: there is no portable no-clobber rename. One
        // pipeline owns the vault, so the window only matters to outsiders.
        if fs::try_exists(&to_path).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::AlreadyExists(to.to_path_buf()));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, to))?;
        }
        Ok(fs::rename(&from_path, &to_path).await.map_err(|e| Self::map_io_error(e, from))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(&validate_path(path)?, &metadata)
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("vault", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("vault", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("vault", "relative/path").is_err());
    }

    #[test]
    fn test_relative_path() {
        let (temp_dir, backend) = backend();
        let abs = temp_dir.path().join("Inbox/link.txt");
        assert_eq!(backend.relative_path(&abs).unwrap(), Path::new("Inbox/link.txt"));
        assert!(backend.relative_path("/somewhere/else.txt").is_err());
    }

    #[tokio::test]
    async fn test_write_read_and_overwrite() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("Inbox/a/b/note.txt"), b"first").await.unwrap();
        backend.write(Path::new("Inbox/a/b/note.txt"), b"second").await.unwrap();
        assert_eq!(backend.read(Path::new("Inbox/a/b/note.txt")).await.unwrap(), b"second");
        // No temporary files are left behind next to the target.
        let files = backend.list(Some(Path::new("Inbox/a/b"))).await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_never_overwrites() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("Inbox/draft.md"), b"new").await.unwrap();
        backend.write(Path::new("Archive/draft.md"), b"old").await.unwrap();
        let err = backend.rename(Path::new("Inbox/draft.md"), Path::new("Archive/draft.md")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(backend.read(Path::new("Archive/draft.md")).await.unwrap(), b"old");
        assert!(backend.exists(Path::new("Inbox/draft.md")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_creates_directories() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("Inbox/link.txt"), b"data").await.unwrap();
        backend.rename(Path::new("Inbox/link.txt"), Path::new("Inbox/Archive/2024/link.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("Inbox/link.txt")).await.unwrap());
        assert!(backend.exists(Path::new("Inbox/Archive/2024/link.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_missing_source() {
        let (_tmp, backend) = backend();
        let err = backend.rename(Path::new("gone.txt"), Path::new("there.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("file.txt"), b"data").await.unwrap();
        backend.delete(Path::new("file.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("file.txt")).await.unwrap());
        let err = backend.delete(Path::new("file.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("Inbox/photo.jpg"), b"\xFF\xD8\xFF").await.unwrap();
        let info = backend.stat(Path::new("./Inbox/photo.jpg")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("Inbox/photo.jpg"));
        assert_eq!(info.size, 3);
        // Directories are not files.
        let err = backend.stat(Path::new("Inbox")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_dir_is_idempotent() {
        let (temp_dir, backend) = backend();
        backend.create_dir(Path::new("Inbox/Archive")).await.unwrap();
        backend.create_dir(Path::new("Inbox/Archive/")).await.unwrap();
        assert!(temp_dir.path().join("Inbox/Archive").is_dir());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("Inbox/one.txt"), b"1").await.unwrap();
        backend.write(Path::new("Inbox/nested/two.md"), b"2").await.unwrap();
        backend.write(Path::new("Inboxes/three.txt"), b"3").await.unwrap();
        backend.write(Path::new("Recipes/four.md"), b"4").await.unwrap();
        let mut paths: Vec<_> =
            backend.list(Some(Path::new("Inbox/"))).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("Inbox/nested/two.md"), PathBuf::from("Inbox/one.txt")]);
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_nested_prefix() {
        let (_tmp, backend) = backend();
        backend.write(Path::new("Vault/Inbox/one.txt"), b"1").await.unwrap();
        backend.write(Path::new("Vault/Other/two.txt"), b"2").await.unwrap();
        let files = backend.list(Some(Path::new("Vault/Inbox"))).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("Vault/Inbox/one.txt"));
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let (_tmp, backend) = backend();
        assert!(backend.list(Some(Path::new("nothing/here"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_tmp, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.txt"), b"data").await.is_err());
        assert!(backend.rename(Path::new("a.txt"), Path::new("../../b.txt")).await.is_err());
    }
}
