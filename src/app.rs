//! Wiring: turns a validated [`Config`] into a running pipeline.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use larder_config::Config;
use larder_document::{BasicExtractor, FileNamer, MarkdownWriter};
use larder_inbox::{Collaborators, Notifier, Pipeline, Settings};
use larder_ledger::{JsonStore, LedgerStore};
use larder_storage::BackendHandle;
use larder_storage::backend::LocalBackend;
use std::sync::Arc;

/// Emits each notification as an `info` event.
pub struct TracingNotifier;
impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(target: "larder::notify", "{message}");
    }
}

pub struct App {
    pub backend: Arc<LocalBackend>,
    pub pipeline: Arc<Pipeline>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let backend = Arc::new(LocalBackend::new("vault", config.vault()).or_raise(|| ErrorKind::Startup)?);
        let handle: BackendHandle = backend.clone();
        let namer: FileNamer = config.filename.parse::<FileNamer>().or_raise(|| ErrorKind::Startup)?;
        let writer = MarkdownWriter::new(handle.clone(), &config.output, namer).or_raise(|| ErrorKind::Startup)?;
        let collaborators = Collaborators {
            extractor: Arc::new(BasicExtractor),
            writer: Arc::new(writer),
            notifier: Arc::new(TracingNotifier),
        };
        let pipeline =
            Pipeline::open(handle.clone(), ledger_store(config, handle), config.ledger.capacity, settings(config), collaborators)
                .await
                .or_raise(|| ErrorKind::Startup)?;
        Ok(Self { backend, pipeline: Arc::new(pipeline) })
    }
}

pub fn ledger_store(config: &Config, backend: BackendHandle) -> Arc<dyn LedgerStore> {
    Arc::new(JsonStore::new(backend, &config.ledger.path))
}

/// Pipeline settings for `config`. The ledger file and the output folder are
/// never captures, even when configured inside the inbox.
pub fn settings(config: &Config) -> Settings {
    Settings::new(&config.inbox, &config.archive)
        .with_ignored(&config.ledger.path)
        .with_ignored(&config.output)
        .with_concurrency(config.scan.concurrency)
}
