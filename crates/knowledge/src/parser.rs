//! Document parsing and text extraction.

use ragstep_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    Markdown,
    Html,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }

    /// Whether directory ingestion picks up files of this type.
    pub fn is_ingestible(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Turns a document into plain text.
///
/// Implementations report every failure as `AppError::DocumentUnreadable`,
/// including documents that contain no text at all.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> AppResult<String>;
}

/// Parser for files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParser;

impl FileParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for FileParser {
    fn parse(&self, path: &Path) -> AppResult<String> {
        let content_type = ContentType::from_path(path);
        tracing::debug!("Parsing {:?} as {}", path, content_type.as_str());

        let text = match content_type {
            ContentType::Pdf => pdf_extract::extract_text(path).map_err(|e| {
                AppError::DocumentUnreadable(format!("{}: {}", path.display(), e))
            })?,
            ContentType::Markdown => clean_markdown(&read_text(path)?),
            ContentType::Html => clean_html(&read_text(path)?),
            ContentType::PlainText => read_text(path)?,
            ContentType::Unknown => {
                let raw = read_text(path)?;
                if raw.contains('\0') {
                    return Err(AppError::DocumentUnreadable(format!(
                        "{}: binary content",
                        path.display()
                    )));
                }
                raw
            }
        };

        if text.trim().is_empty() {
            return Err(AppError::DocumentUnreadable(format!(
                "{}: no extractable text",
                path.display()
            )));
        }

        Ok(text)
    }
}

fn read_text(path: &Path) -> AppResult<String> {
    fs::read_to_string(path)
        .map_err(|e| AppError::DocumentUnreadable(format!("{}: {}", path.display(), e)))
}

/// Strip heading markers, rules and code fences.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Strip tags along with script and style bodies, then collapse whitespace.
fn clean_html(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut skipping = false;

    for (i, ch) in text.char_indices() {
        match ch {
            '<' => {
                in_tag = true;
                let rest = &lower[i..];
                if rest.starts_with("<script") || rest.starts_with("<style") {
                    skipping = true;
                } else if rest.starts_with("</script") || rest.starts_with("</style") {
                    skipping = false;
                }
            }
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag && !skipping => result.push(ch),
            _ => {}
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
