//! Default collaborators for the inbox pipeline.
//!
//! - [`BasicExtractor`] derives a [`Recipe`](larder_inbox::Recipe) from a job
//!   with simple heuristics and no network access.
//! - [`MarkdownWriter`] renders a recipe as a markdown note with YAML front
//!   matter, named by a [`FileNamer`] template.

pub mod error;
mod extractor;
mod markdown;
pub mod template;
mod writer;

pub use crate::extractor::BasicExtractor;
pub use crate::markdown::render_document;
pub use crate::template::FileNamer;
pub use crate::writer::MarkdownWriter;
