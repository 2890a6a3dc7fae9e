//! Job construction from raw inbox files.
//!
//! A file dropped into the inbox is classified by its (case-insensitive)
//! extension into one of three shapes:
//!
//! | Shape    | Extensions                                       | Job kind             |
//! |----------|--------------------------------------------------|----------------------|
//! | Manifest | `json`                                           | as declared          |
//! | Image    | `jpg` `jpeg` `png` `gif` `webp` `heic` `heif`    | `image`              |
//! | Text     | `txt` `text` `md` `markdown`                     | `url` or `text`      |
//!
//! Each shape derives a [`JobKey`] differently; see [`build_job`] for details.

mod builder;
pub mod error;

pub use self::builder::{build_job, fallback_key};
pub(crate) use self::builder::build_job_inner;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub(crate) const MANIFEST_EXTENSIONS: &[&str] = &["json"];
pub(crate) const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "heif"];
pub(crate) const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown"];

/// What a capture describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[display("url")]
    Url,
    #[display("text")]
    Text,
    #[display("image")]
    Image,
}
impl JobKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "url" => Some(Self::Url),
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A normalized description of one capture.
///
/// `content` is never empty: a URL, free text, or the path/identifier of an
/// image payload. This is also the manifest schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxJob {
    pub kind: JobKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Identity of a job: the ledger key and the key of the per-identity lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub struct JobKey(String);
impl JobKey {
    /// Domain-separated BLAKE3 digest of `parts`.
    ///
    /// Every part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// hash differently.
    pub(crate) fn digest(domain: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"larder/");
        hasher.update(domain.as_bytes());
        hasher.update(&[0]);
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Use an identifier supplied by the capture itself.
    pub(crate) fn explicit(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Binary payload handed to the extractor alongside an image job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

/// The result of classifying one inbox file.
#[derive(Debug, Clone)]
pub struct BuiltJob {
    pub job: InboxJob,
    pub key: JobKey,
    pub image: Option<ImagePayload>,
    /// Another file that belongs to this job and is archived with it.
    pub secondary: Option<PathBuf>,
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        extensions.contains(&ext.as_str())
    })
}

/// Whether `path` looks like a job manifest.
pub fn is_manifest(path: &Path) -> bool {
    has_extension(path, MANIFEST_EXTENSIONS)
}

/// Media type for an image path, by extension.
pub(crate) fn media_type(path: &Path) -> &'static str {
    let ext = path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}
