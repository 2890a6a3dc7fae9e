use crate::error::{ErrorKind as InboxErrorKind, Result as InboxResult};
use crate::job::error::{ErrorKind, Result};
use crate::job::{
    BuiltJob, IMAGE_EXTENSIONS, ImagePayload, InboxJob, JobKey, JobKind, MANIFEST_EXTENSIONS, TEXT_EXTENSIONS,
    has_extension, media_type,
};
use exn::ResultExt;
use larder_storage::{BackendHandle, FileInfo, validate_path};
use serde::Deserialize;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;
use url::Url;

/// Classifies `file` and turns it into a [`BuiltJob`].
///
/// - **Manifest**: the JSON body is the job. The key is the manifest `id`
///   when it is not blank, otherwise a digest of the whole job. Image
///   manifests name a file next to the manifest, which becomes the payload
///   and the secondary file.
/// - **Image**: the file is the payload. The key is a digest of path,
///   modification time and size, so re-saving a photo counts as new.
/// - **Text**: trimmed content; a bare `http(s)` URL becomes a `url` job,
///   anything else a `text` job. The key is a digest of the content alone,
///   so the same snippet under a new name is a duplicate.
///
/// # Errors
/// Returns [`Exn<InboxErrorKind::Build>`](InboxErrorKind::Build) raised from
/// an inner [`Exn<ErrorKind>`](ErrorKind).
pub async fn build_job(backend: &BackendHandle, file: &FileInfo) -> InboxResult<BuiltJob> {
    build_job_inner(backend, file).await.or_raise(|| InboxErrorKind::Build)
}

#[instrument(skip_all, fields(path = %file.path.display()))]
pub(crate) async fn build_job_inner(backend: &BackendHandle, file: &FileInfo) -> Result<BuiltJob> {
    let extension = file.extension().unwrap_or_default();
    let built = if MANIFEST_EXTENSIONS.contains(&extension.as_str()) {
        build_manifest(backend, file).await?
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        build_image(backend, file).await?
    } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        build_text(backend, file).await?
    } else if extension.is_empty() {
        exn::bail!(ErrorKind::UnsupportedType(file.file_name()));
    } else {
        exn::bail!(ErrorKind::UnsupportedType(format!(".{extension}")));
    };
    tracing::debug!(kind = %built.job.kind, key = %built.key, "Built job");
    Ok(built)
}

/// Identity used for the ledger when a file could not be turned into a job.
///
/// `modified` is `None` when the file could not even be inspected.
pub fn fallback_key(path: &Path, modified: Option<OffsetDateTime>) -> JobKey {
    let nanos = modified.map(OffsetDateTime::unix_timestamp_nanos).unwrap_or_default();
    JobKey::digest("file", &[path.to_string_lossy().as_bytes(), nanos.to_le_bytes().as_slice()])
}

/// Manifests are validated field by field so that the reason in the
/// quarantine note says what is actually wrong.
#[derive(Deserialize)]
struct RawManifest {
    kind: Option<String>,
    content: Option<String>,
    created_at: Option<String>,
    id: Option<String>,
    source: Option<String>,
}

async fn build_manifest(backend: &BackendHandle, file: &FileInfo) -> Result<BuiltJob> {
    let bytes = backend.read(&file.path).await.or_raise(|| ErrorKind::Storage)?;
    let raw: RawManifest = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(e) => exn::bail!(ErrorKind::InvalidJob(format!("malformed manifest: {e}"))),
    };
    let Some(kind) = raw.kind else {
        exn::bail!(ErrorKind::InvalidJob("missing kind".to_string()));
    };
    let Some(kind) = JobKind::from_name(kind.trim()) else {
        exn::bail!(ErrorKind::InvalidJob(format!("unknown kind: {kind}")));
    };
    let content = raw.content.as_deref().map(str::trim).unwrap_or_default();
    if content.is_empty() {
        exn::bail!(ErrorKind::InvalidJob("missing content".to_string()));
    }
    let job = InboxJob {
        kind,
        content: content.to_string(),
        created_at: raw.created_at,
        id: raw.id,
        source: raw.source,
    };

    let key = match job.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => JobKey::explicit(id),
        _ => {
            let envelope =
                serde_json::to_vec(&job).or_raise(|| ErrorKind::InvalidJob("unserializable job".to_string()))?;
            JobKey::digest("manifest", &[envelope.as_slice()])
        },
    };

    let (image, secondary) = if kind == JobKind::Image {
        let folder = file.path.parent().unwrap_or(&file.path);
        let Ok(sibling) = validate_path(folder.join(&job.content)) else {
            exn::bail!(ErrorKind::InvalidJob(format!("image path escapes the vault: {}", job.content)));
        };
        if sibling.parent() != Some(folder) {
            exn::bail!(ErrorKind::InvalidJob(format!("image must sit next to the manifest: {}", job.content)));
        }
        if !has_extension(&sibling, IMAGE_EXTENSIONS) {
            exn::bail!(ErrorKind::InvalidJob(format!("not an image: {}", job.content)));
        }
        if !backend.exists(&sibling).await.or_raise(|| ErrorKind::Storage)? {
            exn::bail!(ErrorKind::InvalidJob(format!("image not found: {}", sibling.display())));
        }
        let bytes = backend.read(&sibling).await.or_raise(|| ErrorKind::Storage)?;
        let payload = ImagePayload { media_type: media_type(&sibling), path: sibling.clone(), bytes };
        (Some(payload), Some(sibling))
    } else {
        (None, None)
    };

    Ok(BuiltJob { job, key, image, secondary })
}

async fn build_image(backend: &BackendHandle, file: &FileInfo) -> Result<BuiltJob> {
    let bytes = backend.read(&file.path).await.or_raise(|| ErrorKind::Storage)?;
    let path = file.path.to_string_lossy();
    let key = JobKey::digest(
        "image",
        &[
            path.as_bytes(),
            file.modified.unix_timestamp_nanos().to_le_bytes().as_slice(),
            file.size.to_le_bytes().as_slice(),
        ],
    );
    let job = InboxJob {
        kind: JobKind::Image,
        content: path.into_owned(),
        created_at: file.modified.format(&Rfc3339).ok(),
        id: None,
        source: None,
    };
    let image = ImagePayload { path: file.path.clone(), bytes, media_type: media_type(&file.path) };
    Ok(BuiltJob { job, key, image: Some(image), secondary: Some(file.path.clone()) })
}

async fn build_text(backend: &BackendHandle, file: &FileInfo) -> Result<BuiltJob> {
    let bytes = backend.read(&file.path).await.or_raise(|| ErrorKind::Storage)?;
    let text = String::from_utf8_lossy(&bytes);
    let content = text.trim();
    if content.is_empty() {
        exn::bail!(ErrorKind::EmptyJob);
    }
    let kind = if is_bare_url(content) { JobKind::Url } else { JobKind::Text };
    let key = JobKey::digest(&kind.to_string(), &[content.as_bytes()]);
    let job = InboxJob {
        kind,
        content: content.to_string(),
        created_at: file.modified.format(&Rfc3339).ok(),
        id: None,
        source: None,
    };
    Ok(BuiltJob { job, key, image: None, secondary: None })
}

/// A single `http`/`https` URL and nothing else.
fn is_bare_url(content: &str) -> bool {
    if content.contains(char::is_whitespace) {
        return false;
    }
    Url::parse(content).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_storage::StorageBackend;
    use larder_storage::backend::MockBackend;
    use rstest::rstest;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn backend(files: &[(&str, &str)]) -> BackendHandle {
        Arc::new(MockBackend::with_files(files.iter().map(|(p, c)| (PathBuf::from(p), c.as_bytes().to_vec()))))
    }

    async fn build(backend: &BackendHandle, path: &str) -> Result<BuiltJob> {
        let file = backend.stat(Path::new(path)).await.unwrap();
        build_job_inner(backend, &file).await
    }

    #[rstest]
    #[case("https://example.com/r", true)]
    #[case("http://example.com", true)]
    #[case("ftp://example.com/r", false)]
    #[case("https://example.com/r and more", false)]
    #[case("example.com/r", false)]
    #[case("mailto:cook@example.com", false)]
    fn test_is_bare_url(#[case] content: &str, #[case] expected: bool) {
        assert_eq!(is_bare_url(content), expected);
    }

    #[tokio::test]
    async fn test_text_with_url_is_url_job() {
        let backend = backend(&[("Inbox/link.txt", "  https://example.com/r\n")]);
        let built = build(&backend, "Inbox/link.txt").await.unwrap();
        assert_eq!(built.job.kind, JobKind::Url);
        assert_eq!(built.job.content, "https://example.com/r");
        assert!(built.job.created_at.is_some());
        assert!(built.image.is_none());
        assert!(built.secondary.is_none());
    }

    #[tokio::test]
    async fn test_text_key_ignores_path() {
        let backend = backend(&[("Inbox/a.md", "Pancakes\nflour"), ("Inbox/b.txt", "\nPancakes\nflour\n\n")]);
        let a = build(&backend, "Inbox/a.md").await.unwrap();
        let b = build(&backend, "Inbox/b.txt").await.unwrap();
        assert_eq!(a.job.kind, JobKind::Text);
        assert_eq!(a.key, b.key);
    }

    #[tokio::test]
    async fn test_blank_text_is_empty_job() {
        let backend = backend(&[("Inbox/blank.txt", " \n\t ")]);
        let err = build(&backend, "Inbox/blank.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyJob));
    }

    #[rstest]
    #[case("Inbox/notes.pdf", ".pdf")]
    #[case("Inbox/Makefile", "Makefile")]
    #[tokio::test]
    async fn test_unsupported_type(#[case] path: &str, #[case] reported: &str) {
        let backend = backend(&[(path, "x")]);
        let err = build(&backend, path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedType(ext) if ext == reported));
    }

    #[tokio::test]
    async fn test_image_file() {
        let backend = backend(&[("Inbox/Photo.JPG", "jpegbytes")]);
        let built = build(&backend, "Inbox/Photo.JPG").await.unwrap();
        assert_eq!(built.job.kind, JobKind::Image);
        assert_eq!(built.job.content, "Inbox/Photo.JPG");
        assert_eq!(built.secondary.as_deref(), Some(Path::new("Inbox/Photo.JPG")));
        let image = built.image.unwrap();
        assert_eq!(image.bytes, b"jpegbytes");
        assert_eq!(image.media_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_image_key_depends_on_path() {
        let backend = backend(&[("Inbox/a.png", "same"), ("Inbox/b.png", "same")]);
        let a = build(&backend, "Inbox/a.png").await.unwrap();
        let b = build(&backend, "Inbox/b.png").await.unwrap();
        assert_ne!(a.key, b.key);
    }

    #[tokio::test]
    async fn test_image_manifest_loads_sibling() {
        let backend = backend(&[
            ("Inbox/job.json", r#"{"kind":"image","content":"photo.jpg","source":"phone"}"#),
            ("Inbox/photo.jpg", "jpegbytes"),
        ]);
        let built = build(&backend, "Inbox/job.json").await.unwrap();
        assert_eq!(built.job.kind, JobKind::Image);
        assert_eq!(built.job.source.as_deref(), Some("phone"));
        assert_eq!(built.secondary.as_deref(), Some(Path::new("Inbox/photo.jpg")));
        assert_eq!(built.image.unwrap().bytes, b"jpegbytes");
    }

    #[tokio::test]
    async fn test_manifest_id_is_the_key() {
        let backend = backend(&[
            ("Inbox/a.json", r#"{"kind":"url","content":"https://example.com/r","id":"share-42"}"#),
            ("Inbox/b.json", r#"{"kind":"url","content":"https://example.com/r"}"#),
            ("Inbox/c.json", r#"{"kind":"url","content":"https://example.com/r","id":"  "}"#),
        ]);
        assert_eq!(build(&backend, "Inbox/a.json").await.unwrap().key.as_str(), "share-42");
        let b = build(&backend, "Inbox/b.json").await.unwrap();
        let c = build(&backend, "Inbox/c.json").await.unwrap();
        assert_eq!(b.key.as_str().len(), 64);
        // The blank id is part of the envelope.
        assert_ne!(b.key, c.key);
    }

    #[rstest]
    #[case(r#"{"kind":"image","content":"missing.jpg"}"#, "image not found")]
    #[case(r#"{"kind":"image","content":"../../etc/passwd"}"#, "escapes the vault")]
    #[case(r#"{"kind":"image","content":"../Recipes/soup.md"}"#, "must sit next to the manifest")]
    #[case(r#"{"kind":"image","content":"sub/photo.jpg"}"#, "must sit next to the manifest")]
    #[case(r#"{"kind":"image","content":"notes.txt"}"#, "not an image")]
    #[case(r#"{"kind":"image","content":"job.json"}"#, "not an image")]
    #[case(r#"{"kind":"video","content":"x"}"#, "unknown kind: video")]
    #[case(r#"{"kind":"url","content":"   "}"#, "missing content")]
    #[case(r#"{"content":"x"}"#, "missing kind")]
    #[case(r#"{"kind":"url","content":"#, "malformed manifest")]
    #[case(r#"["url"]"#, "malformed manifest")]
    #[tokio::test]
    async fn test_invalid_manifest(#[case] body: &str, #[case] reason: &str) {
        let backend = backend(&[("Inbox/job.json", body)]);
        let err = build(&backend, "Inbox/job.json").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidJob(msg) if msg.contains(reason)), "{err:?}");
    }

    #[test]
    fn test_fallback_key_depends_on_mtime() {
        let path = Path::new("Inbox/broken.json");
        let now = OffsetDateTime::now_utc();
        assert_eq!(fallback_key(path, Some(now)), fallback_key(path, Some(now)));
        assert_ne!(fallback_key(path, Some(now)), fallback_key(path, None));
    }

    #[tokio::test]
    async fn test_public_entry_point_raises_build() {
        let backend = backend(&[("Inbox/blank.txt", "")]);
        let file = backend.stat(Path::new("Inbox/blank.txt")).await.unwrap();
        let err = build_job(&backend, &file).await.unwrap_err();
        assert!(matches!(&*err, InboxErrorKind::Build));
    }
}
