//! Persistence for ledger snapshots.

use crate::entry::LedgerEntry;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use larder_storage::BackendHandle;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::instrument;

/// Where a [`Ledger`](crate::Ledger) keeps its snapshots.
///
/// Snapshots are always complete and time-ordered; there is no incremental
/// format, so `save` simply replaces whatever was stored before.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the last saved snapshot; an empty list when nothing was saved.
    async fn load(&self) -> Result<Vec<LedgerEntry>>;
    /// Replace the stored snapshot.
    async fn save(&self, entries: &[LedgerEntry]) -> Result<()>;
}

/// Stores the ledger as a pretty-printed JSON array in the vault.
pub struct JsonStore {
    backend: BackendHandle,
    path: PathBuf,
}
impl JsonStore {
    pub fn new(backend: BackendHandle, path: impl Into<PathBuf>) -> Self {
        Self { backend, path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Vec<LedgerEntry>> {
        if !self.backend.exists(&self.path).await.or_raise(|| ErrorKind::Storage)? {
            tracing::debug!("No ledger on disk yet; starting empty");
            return Ok(Vec::new());
        }
        let bytes = self.backend.read(&self.path).await.or_raise(|| ErrorKind::Storage)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData)
    }

    async fn save(&self, entries: &[LedgerEntry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).or_raise(|| ErrorKind::Serialization)?;
        self.backend.write(&self.path, &json).await.or_raise(|| ErrorKind::Storage)
    }
}

/// Keeps snapshots in memory.
///
/// Not `#[cfg(test)]` so that other crates can use it in their tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<LedgerEntry>,
    saves: usize,
    failing: bool,
}

impl MemoryStore {
    pub fn with_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { state: Mutex::new(MemoryState { entries, ..Default::default() }) }
    }

    /// The most recently saved snapshot.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.state().entries.clone()
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.state().saves
    }

    /// Make every subsequent save fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.state().entries.clone())
    }

    async fn save(&self, entries: &[LedgerEntry]) -> Result<()> {
        let mut state = self.state();
        if state.failing {
            exn::bail!(ErrorKind::Storage);
        }
        state.entries = entries.to_vec();
        state.saves += 1;
        Ok(())
    }
}
