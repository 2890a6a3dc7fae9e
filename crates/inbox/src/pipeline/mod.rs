//! The inbox pipeline.
//!
//! Every file reaches exactly one terminal outcome: a new document
//! ([`Outcome::Created`]), a recognized duplicate ([`Outcome::Duplicate`],
//! archived with [`DUPE_SUFFIX`]) or a quarantined failure
//! ([`Outcome::Quarantined`], archived with the error marker plus a note).
//!
//! ```text
//! signal ─▶ claim path ─▶ build job ─▶ lock key ─▶ ledger says done? ──yes──▶ dupe
//!                              │                        │ no
//!                              ▼                        ▼
//!                          quarantine ◀──fail── extract ─▶ write ─▶ record ─▶ archive
//! ```
//!
//! On the success path the ledger write is awaited before the original is
//! archived: if the process dies in between, the still-present file is
//! caught by the dedup check on the next run.

pub mod error;
mod guard;
mod signal;
mod stream;

pub use self::signal::FileSignal;
pub use self::stream::{ScanEvent, ScanSummary};
use crate::archive::{Archiver, DUPE_SUFFIX, ERROR_SUFFIX, is_quarantined};
use crate::collab::{Extractor, Notifier, WriteOutcome, Writer};
use crate::error::{ErrorKind as InboxErrorKind, Result as InboxResult};
use crate::job::{BuiltJob, JobKey, build_job_inner, fallback_key};
use crate::pipeline::error::{Error, ErrorKind};
use crate::pipeline::guard::{InFlight, KeyedLocks};
use crate::quarantine::quarantine;
use exn::ResultExt;
use larder_ledger::{Ledger, LedgerStore};
use larder_storage::error::ErrorKind as StorageErrorKind;
use larder_storage::{BackendHandle, validate_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Files processed at once during a scan when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Where the pipeline looks and where it puts things. All paths are
/// relative to the storage backend's root.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Folder watched for captures (recursively).
    pub inbox: PathBuf,
    /// Terminal resting place for processed files. May live inside `inbox`.
    pub archive: PathBuf,
    /// Further paths inside the inbox that are never treated as captures,
    /// such as the ledger file or the output folder.
    pub ignore: Vec<PathBuf>,
    /// Upper bound on files processed at once during a scan.
    pub concurrency: usize,
}
impl Settings {
    pub fn new(inbox: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self { inbox: inbox.into(), archive: archive.into(), ignore: Vec::new(), concurrency: DEFAULT_CONCURRENCY }
    }

    pub fn with_ignored(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignore.push(path.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Normalizes every path (trailing slashes, `.` segments) and rejects
    /// anything that would escape the vault.
    fn normalized(self) -> InboxResult<Self> {
        let normalize = |path: &Path| validate_path(path).or_raise(|| InboxErrorKind::Settings);
        Ok(Self {
            inbox: normalize(&self.inbox)?,
            archive: normalize(&self.archive)?,
            ignore: self.ignore.iter().map(|path| normalize(path)).collect::<InboxResult<_>>()?,
            concurrency: self.concurrency.max(1),
        })
    }
}

/// The services the pipeline hands work to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub writer: Arc<dyn Writer>,
    pub notifier: Arc<dyn Notifier>,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a capture: outside the inbox, inside the archive, quarantined or
    /// explicitly ignored.
    Ignored(PathBuf),
    /// Another run is already handling this path.
    Busy(PathBuf),
    /// The file was gone by the time its run started.
    Vanished(PathBuf),
    /// A new document was written; the original was archived.
    Created { source: PathBuf, output: PathBuf },
    /// The job had already been processed; the original was archived as a
    /// duplicate (`archived` is `None` if that move failed).
    Duplicate { source: PathBuf, archived: Option<PathBuf> },
    /// The job failed; the original was moved aside (`archived` is `None` if
    /// that move failed) and a note explains why.
    Quarantined { source: PathBuf, archived: Option<PathBuf>, reason: String },
}
impl Outcome {
    /// The inbox path this outcome is about.
    pub fn source(&self) -> &Path {
        match self {
            Self::Ignored(path) | Self::Busy(path) | Self::Vanished(path) => path,
            Self::Created { source, .. } | Self::Duplicate { source, .. } | Self::Quarantined { source, .. } => source,
        }
    }
}

pub struct Pipeline {
    backend: BackendHandle,
    ledger: Mutex<Ledger>,
    archiver: Archiver,
    settings: Settings,
    collaborators: Collaborators,
    in_flight: InFlight,
    locks: KeyedLocks,
}

impl Pipeline {
    /// Loads the ledger from `store` and validates `settings`.
    ///
    /// # Errors
    /// [`InboxErrorKind::Ledger`] when the ledger cannot be loaded and
    /// [`InboxErrorKind::Settings`] when a configured path is invalid.
    pub async fn open(
        backend: BackendHandle,
        store: Arc<dyn LedgerStore>,
        capacity: usize,
        settings: Settings,
        collaborators: Collaborators,
    ) -> InboxResult<Self> {
        let settings = settings.normalized()?;
        let ledger = Ledger::open(store, capacity).await.or_raise(|| InboxErrorKind::Ledger)?;
        tracing::debug!(entries = ledger.len(), capacity = ledger.capacity(), "Loaded ledger");
        Ok(Self {
            archiver: Archiver::new(backend.clone(), settings.archive.clone()),
            backend,
            ledger: Mutex::new(ledger),
            settings,
            collaborators,
            in_flight: InFlight::default(),
            locks: KeyedLocks::default(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether `path` is something the pipeline should process at all.
    pub fn is_candidate(&self, path: &Path) -> bool {
        path.starts_with(&self.settings.inbox)
            && path != self.settings.inbox
            && !path.starts_with(&self.settings.archive)
            && !self.settings.ignore.iter().any(|ignored| path.starts_with(ignored))
            && !is_quarantined(path)
    }

    /// Entry point for "this file changed" notifications.
    ///
    /// Paths that are not candidates (see [`is_candidate`](Self::is_candidate))
    /// are ignored, since the pipeline's own archive moves and notes show up
    /// here too.
    pub async fn on_file_touched(&self, path: &Path) -> Outcome {
        let Ok(path) = validate_path(path) else {
            return Outcome::Ignored(path.to_path_buf());
        };
        if !self.is_candidate(&path) {
            tracing::trace!(path = %path.display(), "Ignoring non-candidate path");
            return Outcome::Ignored(path);
        }
        self.process_file(&path).await
    }

    /// Takes one file to a terminal outcome. Never fails: every error ends
    /// in quarantine, and problems while quarantining are logged.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Outcome {
        let Ok(path) = validate_path(path) else {
            return Outcome::Ignored(path.to_path_buf());
        };
        let Some(_claim) = self.in_flight.claim(&path) else {
            tracing::debug!("Already in flight");
            return Outcome::Busy(path);
        };

        let file = match self.backend.stat(&path).await {
            Ok(file) => file,
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                tracing::debug!("File vanished before processing");
                return Outcome::Vanished(path);
            },
            Err(err) => {
                let key = fallback_key(&path, None);
                return self.fail(&path, &key, None, err.raise(ErrorKind::Storage)).await;
            },
        };

        let built = match build_job_inner(&self.backend, &file).await {
            Ok(built) => built,
            Err(err) => {
                let key = fallback_key(&path, Some(file.modified));
                let reason = (*err).to_string();
                return self.fail(&path, &key, None, err.raise(ErrorKind::Build(reason))).await;
            },
        };
        // The secondary file is moved with the job, so it must be a capture too.
        if let Some(secondary) = built.secondary.as_deref().filter(|s| *s != path.as_path() && !self.is_candidate(s)) {
            let reason = format!("invalid job: not an inbox capture: {}", secondary.display());
            return self.fail(&path, &built.key, None, Error::from(ErrorKind::Build(reason))).await;
        }

        let _identity = self.locks.lock(built.key.as_str()).await;
        if self.ledger.lock().await.has_success(built.key.as_str()) {
            tracing::info!(key = %built.key, "Job already processed");
            return self.skip(&path, &built, "duplicate job").await;
        }

        let extractor = &self.collaborators.extractor;
        let recipe = match extractor.process(&built.job, built.image.as_ref()).await {
            Ok(recipe) => recipe,
            Err(err) => {
                let reason = (*err).to_string();
                return self.fail(&path, &built.key, Some(&built), err.raise(ErrorKind::Extraction(reason))).await;
            },
        };

        match self.collaborators.writer.create(&recipe, &built.job).await {
            Ok(WriteOutcome::Created(output)) => self.succeed(&path, &built, output).await,
            Ok(WriteOutcome::DuplicateOutput(name)) => {
                tracing::info!(key = %built.key, name = %name, "Document already exists");
                self.skip(&path, &built, &format!("duplicate output: {name}")).await
            },
            Err(err) => {
                let reason = (*err).to_string();
                self.fail(&path, &built.key, Some(&built), err.raise(ErrorKind::Write(reason))).await
            },
        }
    }

    async fn succeed(&self, path: &Path, built: &BuiltJob, output: PathBuf) -> Outcome {
        let detail = output.display().to_string();
        let recorded = self.ledger.lock().await.record_success(built.key.as_str(), detail).await;
        if let Err(err) = recorded {
            return self.fail(path, &built.key, Some(built), err.raise(ErrorKind::Ledger)).await;
        }
        // From here on the ledger is authoritative; archive failures only
        // leave a file behind that the dedup check will catch next time.
        if let Err(err) = self.archiver.archive_inner(path, None).await {
            tracing::error!(error = ?err, "Could not archive processed file");
        }
        self.archive_secondary(path, built, None).await;
        self.collaborators.notifier.notify(&format!("Created {}", output.display()));
        Outcome::Created { source: path.to_path_buf(), output }
    }

    async fn skip(&self, path: &Path, built: &BuiltJob, detail: &str) -> Outcome {
        let archived = match self.archiver.archive_inner(path, Some(DUPE_SUFFIX)).await {
            Ok(archived) => Some(archived),
            Err(err) => {
                tracing::error!(error = ?err, "Could not archive duplicate");
                None
            },
        };
        self.archive_secondary(path, built, Some(DUPE_SUFFIX)).await;
        if let Err(err) = self.ledger.lock().await.record_skipped(built.key.as_str(), detail).await {
            tracing::error!(error = ?err, "Could not record skipped job");
        }
        self.collaborators.notifier.notify(&format!("Skipped {}: {detail}", path.display()));
        Outcome::Duplicate { source: path.to_path_buf(), archived }
    }

    async fn fail(&self, path: &Path, key: &JobKey, built: Option<&BuiltJob>, err: Error) -> Outcome {
        let reason = (*err).to_string();
        tracing::warn!(key = %key, error = ?err, "Job failed");
        if let Err(err) = self.ledger.lock().await.record_error(key.as_str(), reason.as_str()).await {
            tracing::error!(error = ?err, "Could not record failed job");
        }
        let archived = quarantine(&self.archiver, &self.backend, path, &reason, built.map(|b| &b.job)).await;
        if let Some(built) = built {
            self.archive_secondary(path, built, Some(ERROR_SUFFIX)).await;
        }
        self.collaborators.notifier.notify(&format!("Quarantined {}: {reason}", path.display()));
        Outcome::Quarantined { source: path.to_path_buf(), archived, reason }
    }

    /// Moves a job's second file (the image named by a manifest) along with
    /// the primary one.
    async fn archive_secondary(&self, path: &Path, built: &BuiltJob, suffix: Option<&str>) {
        let Some(secondary) = built.secondary.as_deref().filter(|secondary| *secondary != path) else {
            return;
        };
        if let Err(err) = self.archiver.archive_inner(secondary, suffix).await {
            tracing::error!(secondary = %secondary.display(), error = ?err, "Could not archive secondary file");
        }
    }
}
