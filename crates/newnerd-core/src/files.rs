//! Filename, MIME, and extraction helpers shared by the upload pipeline.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::defaults;

fn unsafe_filename_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w.\-() ]+").expect("static regex"))
}

/// Last path component of a filename or storage path.
pub fn basename(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// Lowercase extension without the dot, or empty when there is none.
pub fn extension(filename: &str) -> String {
    let base = basename(filename);
    match base.rfind('.') {
        Some(idx) => base[idx + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// Filename without its extension, used as a fallback display title.
pub fn stem(filename: &str) -> &str {
    let base = basename(filename);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

/// Replace every run of characters outside `[\w.\-() ]` with `_`.
///
/// Path separators are unsafe characters too, so the result is always a
/// single path component.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = unsafe_filename_chars().replace_all(filename.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "unnamed_file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Storage key for a new upload: `{owner}/{millis}_{sanitized name}`.
pub fn storage_path(owner_id: Uuid, now: DateTime<Utc>, filename: &str) -> String {
    format!(
        "{}/{}_{}",
        owner_id,
        now.timestamp_millis(),
        sanitize_filename(filename)
    )
}

/// Guess a MIME type from the file extension.
pub fn guess_mime_by_extension(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "zip" => "application/zip",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "epub" => "application/epub+zip",
        "html" => "text/html",
        "xml" => "application/xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => defaults::FALLBACK_MIME,
    }
}

/// Prefer the client-declared content type, falling back to the extension.
pub fn resolve_mime(filename: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(mime) if !mime.is_empty() && mime != defaults::FALLBACK_MIME => mime.to_string(),
        _ => guess_mime_by_extension(filename).to_string(),
    }
}

/// How text for the semantic index is obtained for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPlan {
    /// Plain-text formats read directly from the uploaded bytes.
    InlineText,
    /// Formats that need a dedicated reader (PDF, DOCX). Text is only
    /// indexed when the client supplies it or a reader is available.
    External,
    /// Archives and media: no semantic indexing.
    Skip,
}

impl ExtractionPlan {
    pub fn for_filename(filename: &str) -> Self {
        match extension(filename).as_str() {
            "txt" | "md" | "csv" | "json" | "html" | "xml" | "js" | "css" => Self::InlineText,
            "zip" | "rar" | "mp3" | "mp4" => Self::Skip,
            _ => Self::External,
        }
    }

    pub fn should_index(&self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// Library tab filter: document families matched by extension or MIME.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Pdf,
    Docx,
    Txt,
    Csv,
    Json,
    Zip,
    Audio,
    Video,
    /// Unknown filter names match as a literal suffix or MIME fragment.
    Other(String),
}

impl TypeFilter {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "" | "all" => Self::All,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" => Self::Txt,
            "csv" => Self::Csv,
            "json" => Self::Json,
            "zip" => Self::Zip,
            "audio" => Self::Audio,
            "video" => Self::Video,
            other => Self::Other(other.to_string()),
        }
    }

    fn matchers(&self) -> Vec<&str> {
        match self {
            Self::All => Vec::new(),
            Self::Pdf => vec![".pdf", "application/pdf"],
            Self::Docx => vec![".doc", ".docx", "word"],
            Self::Txt => vec![".txt", "text/plain", ".md"],
            Self::Csv => vec![".csv"],
            Self::Json => vec![".json"],
            Self::Zip => vec![".zip", ".rar"],
            Self::Audio => vec![".mp3", "audio/"],
            Self::Video => vec![".mp4", "video/"],
            Self::Other(raw) => vec![raw.as_str()],
        }
    }

    /// Whether a document with this name and MIME type passes the filter.
    pub fn matches(&self, name: &str, mime: &str) -> bool {
        if *self == Self::All {
            return true;
        }
        let name = name.to_lowercase();
        let mime = mime.to_lowercase();
        self.matchers()
            .iter()
            .any(|m| name.ends_with(m) || mime.contains(m))
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into overlapping character windows for embedding.
///
/// Windows break on whitespace when one is available in the back half of
/// the window, so words are rarely split.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size / 2);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        if end < chars.len() {
            if let Some(ws) = chars[start + chunk_size / 2..end]
                .iter()
                .rposition(|c| c.is_whitespace())
            {
                end = start + chunk_size / 2 + ws;
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}
