use crate::error::{ErrorKind, Result};
use crate::markdown::render_document;
use crate::template::FileNamer;
use async_trait::async_trait;
use exn::ResultExt;
use larder_inbox::{InboxJob, Recipe, Rejected, Rejection, WriteOutcome, Writer};
use larder_storage::{BackendHandle, validate_path};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Writes each recipe to `<output>/<name>.md`, never replacing an existing
/// note: a name that is already taken is reported as
/// [`WriteOutcome::DuplicateOutput`].
pub struct MarkdownWriter {
    backend: BackendHandle,
    output: PathBuf,
    namer: FileNamer,
}

impl MarkdownWriter {
    pub fn new(backend: BackendHandle, output: impl Into<PathBuf>, namer: FileNamer) -> Result<Self> {
        let output = output.into();
        let output = validate_path(&output).or_raise(|| ErrorKind::InvalidName(output.display().to_string()))?;
        Ok(Self { backend, output, namer })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    #[instrument(skip_all, fields(title = %recipe.title))]
    async fn create_inner(&self, recipe: &Recipe, job: &InboxJob) -> Result<WriteOutcome> {
        let name = self.namer.name(recipe, job)?;
        let path = self.output.join(format!("{name}.md"));
        if self.backend.exists(&path).await.or_raise(|| ErrorKind::Storage)? {
            tracing::debug!(path = %path.display(), "Document already exists");
            return Ok(WriteOutcome::DuplicateOutput(name));
        }
        let document = render_document(recipe, job);
        self.backend.write(&path, document.as_bytes()).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(path = %path.display(), "Wrote document");
        Ok(WriteOutcome::Created(path))
    }
}

#[async_trait]
impl Writer for MarkdownWriter {
    async fn create(&self, recipe: &Recipe, job: &InboxJob) -> std::result::Result<WriteOutcome, Rejected> {
        self.create_inner(recipe, job).await.map_err(|err| {
            let message = (*err).to_string();
            err.raise(Rejection::new(message))
        })
    }
}
