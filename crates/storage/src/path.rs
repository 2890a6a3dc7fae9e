//! Path validation for vault-relative storage paths.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validates and normalizes a vault-relative path.
///
/// Leading `/`, `.` segments, repeated and trailing separators are dropped;
/// `..` is resolved as long as it never climbs above the root. NUL bytes,
/// Windows prefixes and paths that normalize to nothing are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use larder_storage::validate_path;
///
/// assert_eq!(validate_path("Inbox/Archive/").unwrap(), Path::new("Inbox/Archive"));
/// assert_eq!(validate_path("./Inbox//shared/../note.txt").unwrap(), Path::new("Inbox/note.txt"));
/// assert!(validate_path("../outside.txt").is_err());
/// assert!(validate_path("").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(segment) => {
                // Null bytes survive Path::components() on Unix but truncate
                // in C-based syscalls.
                if segment.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(segment);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Inbox/link.txt", "Inbox/link.txt")]
    #[case("Inbox//Archive", "Inbox/Archive")]
    #[case("Inbox/Archive/", "Inbox/Archive")]
    #[case("Inbox/Archive///", "Inbox/Archive")]
    #[case("./Inbox/./note.md", "Inbox/note.md")]
    #[case("/Inbox", "Inbox")]
    #[case("Inbox/tmp/..", "Inbox")]
    fn test_normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("./")]
    #[case("//")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("Inbox/../../escape")]
    #[case("a\0b")]
    fn test_rejects(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
