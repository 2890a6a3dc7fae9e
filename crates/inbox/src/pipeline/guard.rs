//! Mutual exclusion for pipeline runs.
//!
//! Two layers: [`InFlight`] drops a second signal for a path that is already
//! being handled, and [`KeyedLocks`] serializes different files that resolve
//! to the same job identity so the later one sees the earlier one's ledger
//! entry.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Process-local set of paths being handled right now.
#[derive(Default)]
pub(crate) struct InFlight {
    paths: Mutex<HashSet<PathBuf>>,
}
impl InFlight {
    /// Claims `path`, or returns `None` if it is already claimed.
    pub(crate) fn claim(&self, path: &Path) -> Option<Claim<'_>> {
        self.paths().insert(path.to_path_buf()).then(|| Claim { owner: self, path: path.to_path_buf() })
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, path: &Path) -> bool {
        self.paths().contains(path)
    }

    fn paths(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its path when dropped, however the run ended.
pub(crate) struct Claim<'a> {
    owner: &'a InFlight,
    path: PathBuf,
}
impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.owner.paths().remove(&self.path);
    }
}

/// One async mutex per key, created on demand and dropped with its last user.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl KeyedLocks {
    pub(crate) async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = self.locks().entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard { owner: self, key: key.to_string(), guard: Some(guard) }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks().len()
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}
impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Holding the map lock means nobody can clone the Arc meanwhile, so a
        // count of one after releasing the guard means nobody else wants it.
        let mut locks = self.owner.locks();
        drop(self.guard.take());
        if locks.get(&self.key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
            locks.remove(&self.key);
        }
    }
}
