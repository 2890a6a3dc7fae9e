use crate::template::captured_at;
use larder_inbox::{InboxJob, Recipe};
use std::fmt;
use time::format_description::well_known::Rfc3339;

/// Renders a recipe as a markdown note.
///
/// The front matter is YAML; every scalar is written as a double-quoted JSON
/// string, which YAML reads back verbatim whatever characters the title or
/// source contain. Empty sections are left out.
pub fn render_document(recipe: &Recipe, job: &InboxJob) -> String {
    let mut out = String::from("---\n");
    field(&mut out, "title", Some(recipe.title.as_str()));
    line(&mut out, format_args!("kind: {}", job.kind));
    field(&mut out, "source", recipe.source.as_deref().or(job.source.as_deref()));
    let captured = captured_at(job).format(&Rfc3339).ok();
    field(&mut out, "captured", captured.as_deref());
    field(&mut out, "id", job.id.as_deref());
    if !recipe.tags.is_empty() {
        let tags: Vec<String> = recipe.tags.iter().map(|tag| quote(tag)).collect();
        line(&mut out, format_args!("tags: [{}]", tags.join(", ")));
    }
    out.push_str("---\n\n");

    line(&mut out, format_args!("# {}", recipe.title.trim()));
    if !recipe.ingredients.is_empty() {
        out.push_str("\n## Ingredients\n\n");
        for ingredient in &recipe.ingredients {
            line(&mut out, format_args!("- {ingredient}"));
        }
    }
    if !recipe.steps.is_empty() {
        out.push_str("\n## Steps\n\n");
        for (number, step) in recipe.steps.iter().enumerate() {
            line(&mut out, format_args!("{}. {step}", number + 1));
        }
    }
    if !recipe.notes.is_empty() {
        out.push_str("\n## Notes\n\n");
        for note in &recipe.notes {
            line(&mut out, format_args!("{note}"));
        }
    }
    out
}

fn field(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        line(out, format_args!("{name}: {}", quote(value)));
    }
}

fn line(out: &mut String, args: fmt::Arguments<'_>) {
    out.push_str(&fmt::format(args));
    out.push('\n');
}

fn quote(value: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}
