//! Exactly-once ingestion of captures dropped into an inbox folder.
//!
//! A capture is a link, a text snippet or a photo. Each one is turned into a
//! [job](job::InboxJob), checked against the [ledger](larder_ledger), handed
//! to an [`Extractor`] and a [`Writer`], and finally archived. Failures are
//! quarantined with a note next to the file; nothing is ever deleted.
//!
//! # Architecture
//! - [`job`] classifies files and derives their identity.
//! - [`archive`] moves files into the archive without ever overwriting.
//! - [`pipeline`] orchestrates a single file ([`Pipeline::process_file`]),
//!   whole-inbox scans ([`Pipeline::scan`]) and signal handling
//!   ([`Pipeline::run`]).
//! - [`collab`] defines the collaborator interfaces the pipeline drives.

pub mod archive;
pub mod collab;
pub mod error;
pub mod job;
pub mod pipeline;
mod quarantine;

pub use crate::archive::Archiver;
pub use crate::collab::{Extractor, Notifier, Recipe, Rejected, Rejection, WriteOutcome, Writer};
pub use crate::job::{BuiltJob, ImagePayload, InboxJob, JobKey, JobKind};
pub use crate::pipeline::{Collaborators, FileSignal, Outcome, Pipeline, ScanEvent, ScanSummary, Settings};
pub use crate::quarantine::render_note;
