use crate::entry::{LedgerEntry, Status};
use crate::error::Result;
use crate::store::LedgerStore;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// Maximum number of entries kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 500;

struct Slot {
    /// Insertion counter; breaks ties between identical timestamps.
    seq: u64,
    entry: LedgerEntry,
}

/// Size-bounded, last-write-wins table of job outcomes.
///
/// Every `record_*` call replaces the entry for its key, prunes the table
/// back down to [`capacity`](Self::capacity) (oldest `processedAt` first,
/// insertion order on ties) and awaits a full snapshot save before
/// returning. The in-memory entry stays updated even if the save fails; the
/// error is returned so the caller can react.
///
/// # Examples
///
/// ```
/// use larder_ledger::{Ledger, MemoryStore};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::default());
/// let mut ledger = Ledger::open(store.clone(), 2).await.unwrap();
/// ledger.record_success("a", "Recipes/a.md").await.unwrap();
/// ledger.record_error("b", "quota exceeded").await.unwrap();
/// ledger.record_success("c", "Recipes/c.md").await.unwrap();
///
/// assert!(!ledger.has_success("a")); // pruned
/// assert!(ledger.has_success("c"));
/// assert_eq!(store.snapshot().len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Ledger {
    entries: HashMap<String, Slot>,
    capacity: usize,
    next_seq: u64,
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    /// Load the ledger from `store`, pruning anything beyond `capacity`.
    ///
    /// A capacity of zero is treated as one.
    pub async fn open(store: Arc<dyn LedgerStore>, capacity: usize) -> Result<Self> {
        let loaded = store.load().await?;
        let mut ledger = Self { entries: HashMap::with_capacity(loaded.len()), capacity: capacity.max(1), next_seq: 0, store };
        for entry in loaded {
            ledger.insert(entry);
        }
        let pruned = ledger.prune();
        if pruned > 0 {
            tracing::info!(pruned, capacity = ledger.capacity, "Pruned ledger entries beyond capacity");
        }
        Ok(ledger)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key).map(|slot| &slot.entry)
    }

    /// Whether an output document already exists for `key`.
    ///
    /// `skipped` entries count: they are only ever recorded for identities
    /// that already had a document, and they replace the `success` entry
    /// they were deduplicated against.
    pub fn has_success(&self, key: &str) -> bool {
        self.get(key).is_some_and(|entry| matches!(entry.status, Status::Success | Status::Skipped))
    }

    pub async fn record_success(&mut self, key: &str, detail: impl Into<String>) -> Result<()> {
        self.record(key, Status::Success, Some(detail.into())).await
    }

    pub async fn record_error(&mut self, key: &str, detail: impl Into<String>) -> Result<()> {
        self.record(key, Status::Error, Some(detail.into())).await
    }

    pub async fn record_skipped(&mut self, key: &str, detail: impl Into<String>) -> Result<()> {
        self.record(key, Status::Skipped, Some(detail.into())).await
    }

    /// Record `status` for `key` at the current time.
    pub async fn record(&mut self, key: &str, status: Status, detail: Option<String>) -> Result<()> {
        self.record_at(key, status, detail, OffsetDateTime::now_utc()).await
    }

    /// Record `status` for `key` with an explicit timestamp.
    #[instrument(skip(self, detail))]
    pub async fn record_at(
        &mut self,
        key: &str,
        status: Status,
        detail: Option<String>,
        processed_at: OffsetDateTime,
    ) -> Result<()> {
        self.insert(LedgerEntry { key: key.to_string(), status, processed_at, detail });
        self.prune();
        self.store.save(&self.serialize()).await
    }

    /// Every entry, ascending by `processedAt` (insertion order on ties).
    pub fn serialize(&self) -> Vec<LedgerEntry> {
        self.ordered().into_iter().map(|slot| slot.entry.clone()).collect()
    }

    fn ordered(&self) -> Vec<&Slot> {
        let mut slots: Vec<&Slot> = self.entries.values().collect();
        slots.sort_by_key(|slot| (slot.entry.processed_at, slot.seq));
        slots
    }

    fn insert(&mut self, entry: LedgerEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(entry.key.clone(), Slot { seq, entry });
    }

    /// Evict the oldest entries beyond capacity, returning how many went.
    fn prune(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return 0;
        }
        let evicted: Vec<String> = self.ordered().into_iter().take(excess).map(|slot| slot.entry.key.clone()).collect();
        for key in &evicted {
            self.entries.remove(key);
        }
        excess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use time::Duration;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

    async fn ledger(capacity: usize) -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::default());
        let ledger = Ledger::open(store.clone(), capacity).await.unwrap();
        (store, ledger)
    }

    fn entry(key: &str, status: Status, offset: i64) -> LedgerEntry {
        LedgerEntry { key: key.to_string(), status, processed_at: T0 + Duration::seconds(offset), detail: None }
    }

    #[tokio::test]
    async fn test_every_write_is_persisted() {
        let (store, mut ledger) = ledger(DEFAULT_CAPACITY).await;
        ledger.record_success("a", "Recipes/a.md").await.unwrap();
        ledger.record_error("b", "quota exceeded").await.unwrap();
        assert_eq!(store.saves(), 2);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].detail.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (store, mut ledger) = ledger(DEFAULT_CAPACITY).await;
        ledger.record_error("a", "boom").await.unwrap();
        assert!(!ledger.has_success("a"));
        ledger.record_success("a", "Recipes/a.md").await.unwrap();
        assert!(ledger.has_success("a"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(store.snapshot()[0].status, Status::Success);
    }

    #[tokio::test]
    async fn test_skipped_counts_as_success() {
        let (_store, mut ledger) = ledger(DEFAULT_CAPACITY).await;
        ledger.record_success("a", "Recipes/a.md").await.unwrap();
        ledger.record_skipped("a", "duplicate job").await.unwrap();
        assert!(ledger.has_success("a"));
        assert_eq!(ledger.get("a").unwrap().status, Status::Skipped);
    }

    #[tokio::test]
    async fn test_bounded_keeps_most_recent() {
        let (store, mut ledger) = ledger(3).await;
        for i in 0..10 {
            ledger.record_at(&format!("key-{i}"), Status::Success, None, T0 + Duration::seconds(i)).await.unwrap();
        }
        let keys: Vec<String> = ledger.serialize().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["key-7", "key-8", "key-9"]);
        assert_eq!(store.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_ties_break_by_insertion_order() {
        let (_store, mut ledger) = ledger(2).await;
        ledger.record_at("first", Status::Success, None, T0).await.unwrap();
        ledger.record_at("second", Status::Success, None, T0).await.unwrap();
        ledger.record_at("third", Status::Success, None, T0).await.unwrap();
        let keys: Vec<String> = ledger.serialize().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn test_serialize_is_time_ascending() {
        let (_store, mut ledger) = ledger(DEFAULT_CAPACITY).await;
        ledger.record_at("late", Status::Success, None, T0 + Duration::hours(1)).await.unwrap();
        ledger.record_at("early", Status::Error, None, T0).await.unwrap();
        let keys: Vec<String> = ledger.serialize().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_open_prunes_loaded_entries() {
        let store = Arc::new(MemoryStore::with_entries(vec![
            entry("a", Status::Success, 2),
            entry("b", Status::Success, 0),
            entry("c", Status::Error, 1),
        ]));
        let ledger = Ledger::open(store.clone(), 2).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.get("b").is_none());
        // Opening never writes.
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_one() {
        let (_store, mut ledger) = ledger(0).await;
        ledger.record_success("a", "x").await.unwrap();
        ledger.record_success("b", "y").await.unwrap();
        assert_eq!(ledger.capacity(), 1);
        assert!(ledger.has_success("b"));
        assert!(!ledger.has_success("a"));
    }
}
