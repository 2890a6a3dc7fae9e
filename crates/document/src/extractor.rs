use async_trait::async_trait;
use larder_inbox::{Extractor, ImagePayload, InboxJob, JobKind, Recipe, Rejected, Rejection};
use std::path::Path;
use url::Url;

/// Offline extractor that works from the capture alone.
///
/// - **url**: titled after the last path segment (or the host), with the URL
///   as the source.
/// - **text**: the first line is the title; `Ingredients` and `Steps`
///   (also `Method`, `Directions`, `Instructions`) headings split the body,
///   anything outside those sections becomes a note.
/// - **image**: titled after the file name, with a note pointing at the
///   photo.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicExtractor;

#[async_trait]
impl Extractor for BasicExtractor {
    async fn process(&self, job: &InboxJob, image: Option<&ImagePayload>) -> Result<Recipe, Rejected> {
        let recipe = match job.kind {
            JobKind::Url => from_url(&job.content)?,
            JobKind::Text => from_text(&job.content),
            JobKind::Image => from_image(job, image)?,
        };
        if recipe.title.trim().is_empty() {
            exn::bail!(Rejection::new("no title found"));
        }
        Ok(Recipe { source: recipe.source.or_else(|| job.source.clone()), ..recipe })
    }
}

fn from_url(content: &str) -> Result<Recipe, Rejected> {
    let Ok(url) = Url::parse(content.trim()) else {
        exn::bail!(Rejection::new(format!("not a valid url: {content}")));
    };
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).next_back())
        .map(|segment| {
            // Drop a trailing ".html" or similar.
            let stem = Path::new(segment).file_stem().map_or(segment.into(), |stem| stem.to_string_lossy());
            humanize(&stem)
        })
        .filter(|title| !title.is_empty());
    let title = segment.or_else(|| url.host_str().map(|host| host.trim_start_matches("www.").to_string()));
    Ok(Recipe { title: title.unwrap_or_default(), source: Some(url.to_string()), ..Default::default() })
}

#[derive(Clone, Copy)]
enum Section {
    Notes,
    Ingredients,
    Steps,
}

fn from_text(content: &str) -> Recipe {
    let mut lines = content.lines().map(str::trim).filter(|line| !line.is_empty());
    let title = lines.next().map(|line| line.trim_start_matches('#').trim().to_string()).unwrap_or_default();
    let mut recipe = Recipe { title, ..Default::default() };
    let mut section = Section::Notes;
    for line in lines {
        if let Some(heading) = heading(line) {
            section = heading;
            continue;
        }
        match section {
            Section::Notes => recipe.notes.push(line.to_string()),
            Section::Ingredients => recipe.ingredients.push(strip_marker(line).to_string()),
            Section::Steps => recipe.steps.push(strip_marker(line).to_string()),
        }
    }
    recipe
}

fn from_image(job: &InboxJob, image: Option<&ImagePayload>) -> Result<Recipe, Rejected> {
    let Some(image) = image else {
        exn::bail!(Rejection::new("image payload missing"));
    };
    let title = image.path.file_stem().map(|stem| humanize(&stem.to_string_lossy())).unwrap_or_default();
    Ok(Recipe {
        title,
        notes: vec![format!("Captured from photo {}", job.content)],
        ..Default::default()
    })
}

fn heading(line: &str) -> Option<Section> {
    let name = line.trim_start_matches('#').trim().trim_end_matches(':').trim().to_lowercase();
    match name.as_str() {
        "ingredients" => Some(Section::Ingredients),
        "steps" | "method" | "directions" | "instructions" => Some(Section::Steps),
        "notes" => Some(Section::Notes),
        _ => None,
    }
}

/// Strips a leading list marker: `-`, `*`, `•`, `1.` or `1)`.
fn strip_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim_start();
    }
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0
        && let Some(rest) = line[digits..].strip_prefix(['.', ')'])
    {
        return rest.trim_start();
    }
    line
}

/// `easy-tomato_soup` → `Easy tomato soup`.
fn humanize(raw: &str) -> String {
    let words: Vec<&str> = raw.split(['-', '_', '+', ' ']).filter(|word| !word.is_empty()).collect();
    let joined = words.join(" ");
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
