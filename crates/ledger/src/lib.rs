//! Idempotency ledger for the inbox pipeline.
//!
//! The ledger maps a job identity (its [key](LedgerEntry::key)) to the last
//! terminal outcome recorded for it. It is the durable half of the
//! exactly-once guarantee: the pipeline consults it before extraction and
//! awaits every update before moving on, so a crash can never leave a
//! success unrecorded.
//!
//! # Architecture
//! - [`Ledger`] holds the table in memory, enforces the capacity bound and
//!   hands a full, time-ordered snapshot to its [`LedgerStore`] after every
//!   change.
//! - [`JsonStore`] persists snapshots as a JSON array through a
//!   [storage backend](larder_storage::StorageBackend).
//! - [`MemoryStore`] keeps snapshots in memory for tests.

mod entry;
pub mod error;
mod ledger;
mod store;

pub use crate::entry::{LedgerEntry, Status};
pub use crate::ledger::{DEFAULT_CAPACITY, Ledger};
pub use crate::store::{JsonStore, LedgerStore, MemoryStore};
