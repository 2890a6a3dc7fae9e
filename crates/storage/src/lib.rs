//! Storage backends for the vault that holds the inbox, the archive and the
//! written recipe documents.
//!
//! Every path handed to a [`StorageBackend`] is relative to the backend's
//! root and goes through [`validate_path`] first, so nothing can escape the
//! vault.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
