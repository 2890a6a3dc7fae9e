#![allow(dead_code)]

use async_trait::async_trait;
use larder_inbox::{
    Collaborators, Extractor, ImagePayload, InboxJob, JobKind, Notifier, Pipeline, Recipe, Rejected, Rejection,
    Settings, WriteOutcome, Writer,
};
use larder_ledger::{LedgerEntry, MemoryStore};
use larder_storage::StorageBackend;
use larder_storage::backend::MockBackend;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Extractor that titles a recipe after the first line of the job content.
#[derive(Default)]
pub struct FakeExtractor {
    rejection: Option<String>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    images: Mutex<Vec<ImagePayload>>,
}
impl FakeExtractor {
    pub fn rejecting(message: &str) -> Self {
        Self { rejection: Some(message.to_string()), ..Default::default() }
    }

    /// Every call waits for a [`release`](Self::release) first.
    pub fn gated() -> Self {
        Self { gate: Some(Semaphore::new(0)), ..Default::default() }
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn images(&self) -> Vec<ImagePayload> {
        self.images.lock().unwrap().clone()
    }
}
#[async_trait]
impl Extractor for FakeExtractor {
    async fn process(&self, job: &InboxJob, image: Option<&ImagePayload>) -> Result<Recipe, Rejected> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(image) = image {
            self.images.lock().unwrap().push(image.clone());
        }
        if let Some(message) = &self.rejection {
            return Err(Rejection::new(message.clone()).into());
        }
        let title = match job.kind {
            JobKind::Image => "Photo".to_string(),
            _ => job.content.lines().next().unwrap_or_default().to_string(),
        };
        Ok(Recipe { title, source: Some(job.content.clone()), ..Default::default() })
    }
}

/// Writer that remembers every name it handed out.
#[derive(Default)]
pub struct FakeWriter {
    rejection: Option<String>,
    names: Mutex<HashSet<String>>,
}
impl FakeWriter {
    pub fn rejecting(message: &str) -> Self {
        Self { rejection: Some(message.to_string()), ..Default::default() }
    }

    pub fn with_existing(name: &str) -> Self {
        let writer = Self::default();
        writer.names.lock().unwrap().insert(name.to_string());
        writer
    }

    pub fn slug(title: &str) -> String {
        title
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}
#[async_trait]
impl Writer for FakeWriter {
    async fn create(&self, recipe: &Recipe, _job: &InboxJob) -> Result<WriteOutcome, Rejected> {
        if let Some(message) = &self.rejection {
            return Err(Rejection::new(message.clone()).into());
        }
        let name = Self::slug(&recipe.title);
        if !self.names.lock().unwrap().insert(name.clone()) {
            return Ok(WriteOutcome::DuplicateOutput(name));
        }
        Ok(WriteOutcome::Created(PathBuf::from(format!("Recipes/{name}.md"))))
    }
}

/// Records each notification together with the ledger as persisted at
/// that moment.
pub struct RecordingNotifier {
    store: Arc<MemoryStore>,
    messages: Mutex<Vec<(String, Vec<LedgerEntry>)>>,
}
impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|(message, _)| message.clone()).collect()
    }

    pub fn ledger_at(&self, index: usize) -> Vec<LedgerEntry> {
        self.messages.lock().unwrap()[index].1.clone()
    }
}
impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push((message.to_string(), self.store.snapshot()));
    }
}

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub store: Arc<MemoryStore>,
    pub extractor: Arc<FakeExtractor>,
    pub writer: Arc<FakeWriter>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: Arc<Pipeline>,
}
impl Harness {
    pub async fn new(files: &[(&str, &str)]) -> Self {
        Self::build(files, FakeExtractor::default(), FakeWriter::default(), MemoryStore::default()).await
    }

    pub async fn build(files: &[(&str, &str)], extractor: FakeExtractor, writer: FakeWriter, store: MemoryStore) -> Self {
        let backend = Arc::new(MockBackend::with_files(files.iter().map(|(path, content)| (*path, *content))));
        let store = Arc::new(store);
        let extractor = Arc::new(extractor);
        let writer = Arc::new(writer);
        let notifier = Arc::new(RecordingNotifier { store: store.clone(), messages: Mutex::new(Vec::new()) });
        let settings = Settings::new("Inbox", "Inbox/Archive/").with_ignored("Inbox/.larder").with_concurrency(2);
        let collaborators =
            Collaborators { extractor: extractor.clone(), writer: writer.clone(), notifier: notifier.clone() };
        let pipeline = Pipeline::open(backend.clone(), store.clone(), 500, settings, collaborators).await.unwrap();
        let pipeline = Arc::new(pipeline);
        Self { backend, store, extractor, writer, notifier, pipeline }
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.backend.exists(Path::new(path)).await.unwrap()
    }

    pub async fn read(&self, path: &str) -> String {
        String::from_utf8(self.backend.read(Path::new(path)).await.unwrap()).unwrap()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.backend.paths().await.into_iter().map(|path| path.display().to_string()).collect()
    }
}
