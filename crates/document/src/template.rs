//! Document naming.
//!
//! A [`FileNamer`] renders a user-configured [upon] template against a recipe
//! and the job it came from. Besides upon's built-ins two helpers are
//! registered:
//!
//! - **`slug`** formatter: lowercase, hyphen-separated, quotation marks
//!   dropped first so `"Nonna's" Ragu` becomes `nonnas-ragu`.
//! - **`truncate`** function: cuts a string to at most `n` bytes on a
//!   character boundary, as `truncate(title, 40)` or `{{ title|truncate: 40 }}`.
//!
//! # Template Variables
//!
//! | Variable  | Type             | Description                              |
//! |-----------|------------------|------------------------------------------|
//! | `title`   | `String`         | Recipe title                             |
//! | `kind`    | `String`         | `url`, `text` or `image`                 |
//! | `source`  | `Option<String>` | Where the recipe came from               |
//! | `id`      | `Option<String>` | Identifier supplied by the capture       |
//! | `date`    | `String`         | Capture date as `YYYY-MM-DD`             |
//!
//! ```
//! use larder_document::FileNamer;
//! use larder_inbox::{InboxJob, JobKind, Recipe};
//!
//! let namer: FileNamer = "{{ date }}-{{ title|slug }}".parse().unwrap();
//! let recipe = Recipe { title: "Lemon Drizzle".into(), ..Default::default() };
//! let job = InboxJob {
//!     kind: JobKind::Text,
//!     content: "Lemon Drizzle".into(),
//!     created_at: Some("2026-03-01T08:00:00Z".into()),
//!     id: None,
//!     source: None,
//! };
//! assert_eq!(namer.name(&recipe, &job).unwrap(), "2026-03-01-lemon-drizzle");
//! ```

use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use larder_inbox::{InboxJob, Recipe};
use larder_storage::validate_path;
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;
use upon::{Engine, Template};

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "{{ title|slug }}";

/// Compiled filename template.
pub struct FileNamer {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for FileNamer {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl FileNamer {
    /// Renders the document name, without extension.
    ///
    /// The result may contain `/` to place documents in subfolders of the
    /// output folder; it is normalized and must not climb out of it.
    #[instrument(skip_all, fields(title = %recipe.title))]
    pub fn name(&self, recipe: &Recipe, job: &InboxJob) -> Result<String> {
        let rendered = self
            .template
            .render(&self.engine, Self::parameters(recipe, job))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Self::normalize(rendered)
    }

    fn normalize(rendered: String) -> Result<String> {
        let name = rendered.trim().split('/').map(str::trim).collect::<Vec<_>>().join("/");
        let path = validate_path(&name).or_raise(|| ErrorKind::InvalidName(name.clone()))?;
        // Infallible: built from a String.
        path.to_str().map(str::to_string).ok_or_raise(|| ErrorKind::InvalidName(name))
    }

    fn parameters(recipe: &Recipe, job: &InboxJob) -> upon::Value {
        upon::value! {
            title: recipe.title.as_str(),
            kind: job.kind.to_string(),
            source: recipe.source.as_deref().or(job.source.as_deref()),
            id: job.id.as_deref(),
            date: capture_date(job),
        }
    }
}

/// When the capture was made, falling back to now for captures that do not
/// say.
pub(crate) fn captured_at(job: &InboxJob) -> OffsetDateTime {
    job.created_at
        .as_deref()
        .and_then(|created| OffsetDateTime::parse(created, &Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
}

fn capture_date(job: &InboxJob) -> String {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    captured_at(job).date().format(&format).unwrap_or_default()
}

mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(super) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}
