//! Output formatting for command results.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use bitsift_core::identity::owning_document_of;
use bitsift_core::indexing::IngestReport;
use bitsift_core::retrieval::cascade::CascadeOutcome;
use bitsift_core::retrieval::SpaceHits;
use bitsift_core::space::SpaceKind;
use serde::Serialize;

/// Maximum characters to show in text snippet
const SNIPPET_MAX_LEN: usize = 200;

/// JSON output structure for a space search
#[derive(Serialize)]
pub struct JsonSearchOutput<'a> {
    pub query: &'a str,
    pub space: &'static str,
    pub hits: Vec<JsonHit<'a>>,
}

/// One scored point with its resolved content, if any
#[derive(Serialize)]
pub struct JsonHit<'a> {
    pub id: &'a str,
    pub distance: f32,
    pub content: Option<&'a str>,
}

/// JSON output structure for a full document lookup
#[derive(Serialize)]
pub struct JsonDocument<'a> {
    pub id: &'a str,
    pub document_id: &'a str,
    pub text: &'a str,
}

impl<'a> JsonDocument<'a> {
    pub fn new(id: &'a str, text: &'a str) -> Self {
        Self {
            id,
            document_id: owning_document_of(id),
            text,
        }
    }
}

/// Pairs each point with its content.
///
/// Contents skip unresolvable points, so they can only be paired by position
/// when every point resolved.
fn paired(hits: &SpaceHits) -> Vec<JsonHit<'_>> {
    let aligned = hits.contents.len() == hits.points.len();
    hits.points
        .iter()
        .enumerate()
        .map(|(i, point)| JsonHit {
            id: &point.id,
            distance: point.score,
            content: if aligned {
                hits.contents.get(i).map(String::as_str)
            } else {
                None
            },
        })
        .collect()
}

/// Formats space search hits as JSON.
pub fn format_hits_json(query: &str, space: SpaceKind, hits: &SpaceHits) -> String {
    let output = JsonSearchOutput {
        query,
        space: space.name(),
        hits: paired(hits),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats space search hits for the terminal.
pub fn format_hits_human(query: &str, space: SpaceKind, hits: &SpaceHits) -> String {
    if hits.is_empty() {
        return format!("No results in {} for \"{}\"", space, query);
    }

    let mut output = format!(
        "Found {} hit{} in {} for \"{}\":\n\n",
        hits.points.len(),
        if hits.points.len() == 1 { "" } else { "s" },
        space,
        query
    );

    for (i, hit) in paired(hits).iter().enumerate() {
        output.push_str(&format!(
            "{}. {} (distance: {:.2})\n",
            i + 1,
            hit.id,
            hit.distance
        ));
        if let Some(content) = hit.content {
            let snippet = truncate_text(content, SNIPPET_MAX_LEN);
            output.push_str(&format!("   {}\n", indent_text(&snippet, "   ")));
        }
        output.push('\n');
    }

    if hits.contents.len() < hits.points.len() {
        output.push_str(&format!(
            "({} hit{} could not be resolved)\n",
            hits.points.len() - hits.contents.len(),
            if hits.points.len() - hits.contents.len() == 1 { "" } else { "s" }
        ));
    }

    output.trim_end().to_string()
}

/// Formats a cascade outcome as JSON.
pub fn format_outcome_json(outcome: &CascadeOutcome) -> String {
    serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
}

/// Formats a cascade outcome for the terminal.
pub fn format_outcome_human(query: &str, outcome: &CascadeOutcome) -> String {
    let mut output = String::new();

    match &outcome.answer {
        Some(answer) => output.push_str(&format!("{}\n", answer.trim())),
        None => output.push_str(&format!(
            "No answer for \"{}\": live acquisition failed.\n",
            query
        )),
    }

    if let Some(phase) = outcome.phase {
        output.push_str(&format!("\n   [answered from: {}]\n", phase.name()));
    }
    if let Some(n) = outcome.acquired_documents {
        output.push_str(&format!("   [acquired {} document{}]\n", n, if n == 1 { "" } else { "s" }));
    }

    if !outcome.images.contents.is_empty() {
        output.push_str("\nImages:\n");
        for url in &outcome.images.contents {
            output.push_str(&format!("   {}\n", url));
        }
    }

    output.trim_end().to_string()
}

/// Formats a document's full text as JSON.
pub fn format_document_json(id: &str, text: &str) -> String {
    serde_json::to_string_pretty(&JsonDocument::new(id, text)).unwrap_or_else(|_| "{}".to_string())
}

/// Formats a document's full text for the terminal.
pub fn format_document_human(id: &str, text: &str) -> String {
    let document_id = owning_document_of(id);
    if text.is_empty() {
        return format!("No text found for {}", document_id);
    }
    format!("{}\n\n{}", document_id, text.trim_end())
}

/// Formats the result of ingesting one path.
pub fn format_ingest(path: &str, result: &Result<IngestReport, String>) -> String {
    match result {
        Ok(report) => format!(
            "{} -> {} ({} text, {} metadata point{}{})",
            path,
            report.document_id,
            report.text_points,
            report.metadata_points,
            if report.metadata_points == 1 { "" } else { "s" },
            if report.skipped > 0 {
                format!(", {} skipped", report.skipped)
            } else {
                String::new()
            }
        ),
        Err(e) => format!("{} failed: {}", path, e),
    }
}

/// Truncates text to a maximum length, adding ellipsis if needed.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = &text[..cut];
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{}...", truncated),
    }
}

/// Indents all lines of text after the first line.
fn indent_text(text: &str, indent: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
