//! Interfaces of the services the pipeline hands work to.
//!
//! The pipeline never inspects *why* a collaborator failed: any
//! [`Rejection`] quarantines the job with the rejection message as the
//! reason. Timeouts and retries, if any, belong inside the collaborator.

use crate::job::{ImagePayload, InboxJob};
use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A collaborator refused the job; the message ends up in the ledger and in
/// the quarantine note verbatim.
#[derive(Debug, Display, Error)]
#[display("{_0}")]
pub struct Rejection(#[error(not(source))] pub String);
impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type Rejected = exn::Exn<Rejection>;

/// Structured result of extracting a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Turns a job (plus its image, for image jobs) into a [`Recipe`].
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn process(&self, job: &InboxJob, image: Option<&ImagePayload>) -> Result<Recipe, Rejected>;
}

/// What a [`Writer`] did with a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new document was written at this vault-relative path.
    Created(PathBuf),
    /// A document with this name already exists; nothing was written.
    DuplicateOutput(String),
}

/// Persists a [`Recipe`] as a document.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn create(&self, recipe: &Recipe, job: &InboxJob) -> Result<WriteOutcome, Rejected>;
}

/// Fire-and-forget user notifications, one per terminal outcome.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Discards every notification.
pub struct NullNotifier;
impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}
