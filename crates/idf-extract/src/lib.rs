// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-extract
#![deny(unsafe_code)]
#![warn(missing_docs)]

use idf_error::{ErrorCode, FoundryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extractor-dispatch version pinned into phase manifests.
pub const EXTRACTOR_VERSION: &str = concat!("idf-extract/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One extracted page of a paginated source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PageRecord {
    /// 1-based page number.
    pub page: u32,
    /// Extracted text.
    pub text: String,
    /// `text.chars().count()`.
    pub char_count: usize,
    /// `true` when the text came from an OCR layer.
    #[serde(default)]
    pub ocr_used: bool,
    /// Decoder confidence in `[0, 1]`, when the decoder reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl PageRecord {
    /// Build a page record, deriving the char count.
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_count = text.chars().count();
        Self {
            page,
            text,
            char_count,
            ocr_used: false,
            confidence: None,
        }
    }
}

/// Output of an extractor: flat text or a page stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedDocument {
    /// A single flat text document.
    Flat {
        /// The extracted text.
        text: String,
        /// Document title, when one was found.
        title: Option<String>,
    },
    /// A page-partitioned record stream.
    Paged {
        /// The extracted pages, in order.
        pages: Vec<PageRecord>,
        /// Document title, when one was found.
        title: Option<String>,
    },
}

impl ExtractedDocument {
    /// Collapse into `(text, title)`, joining pages with form feeds so the
    /// page chunking strategy can recover the boundaries.
    pub fn into_text(self) -> (String, Option<String>) {
        match self {
            Self::Flat { text, title } => (text, title),
            Self::Paged { pages, title } => {
                let text = pages
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\u{c}");
                (text, title)
            }
        }
    }

    /// Total char count across the document.
    pub fn char_count(&self) -> usize {
        match self {
            Self::Flat { text, .. } => text.chars().count(),
            Self::Paged { pages, .. } => pages.iter().map(|p| p.char_count).sum(),
        }
    }
}

/// Caller-supplied format hint; `Auto` defers to the content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    /// Pick by content type.
    #[default]
    Auto,
    /// Treat as markdown.
    Markdown,
    /// Treat as HTML.
    Html,
    /// Treat as plain text.
    Txt,
    /// Treat as CSV.
    Csv,
    /// Treat as JSON.
    Json,
    /// Treat as PDF.
    Pdf,
}

// ---------------------------------------------------------------------------
// Trait & registry
// ---------------------------------------------------------------------------

/// A format-specific text decoder.
///
/// External collaborators (full PDF render paths, OCR engines, DOCX readers)
/// implement this and register ahead of the built-ins.
pub trait DocumentExtractor: Send + Sync {
    /// Short decoder name recorded in phase manifests (e.g. `"html-strip"`).
    fn name(&self) -> &'static str;

    /// Decoder version recorded alongside the name.
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Whether this decoder accepts the given content type / hint pair.
    fn can_handle(&self, content_type: Option<&str>, hint: FormatHint) -> bool;

    /// Decode `data` into text.
    ///
    /// # Errors
    ///
    /// Returns `PARSE_ERROR` when the payload is not decodable.
    fn extract(&self, data: &[u8]) -> Result<ExtractedDocument, FoundryError>;
}

/// Ordered decoder registry; first match wins, custom decoders pre-empt the
/// built-ins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn DocumentExtractor>>,
}

impl ExtractorRegistry {
    /// Registry with the built-in decoders (markdown, HTML, PDF text scan,
    /// plain-text fallback — in that order).
    pub fn with_defaults() -> Self {
        Self {
            extractors: vec![
                Box::new(MarkdownExtractor),
                Box::new(HtmlExtractor),
                Box::new(PdfTextScanExtractor),
                Box::new(PlainTextExtractor),
            ],
        }
    }

    /// Register a decoder ahead of the existing ones.
    pub fn register(&mut self, extractor: Box<dyn DocumentExtractor>) {
        self.extractors.insert(0, extractor);
    }

    /// Pick the first decoder accepting `(content_type, hint)`.
    pub fn dispatch(
        &self,
        content_type: Option<&str>,
        hint: FormatHint,
    ) -> Option<&dyn DocumentExtractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(content_type, hint))
            .map(|e| e.as_ref())
    }

    /// Dispatch and run extraction, returning the decoded document plus the
    /// `name/version` tag recorded in the phase manifest.
    ///
    /// # Errors
    ///
    /// `PARSE_ERROR` when no decoder accepts the input or decoding fails.
    pub fn extract(
        &self,
        data: &[u8],
        content_type: Option<&str>,
        hint: FormatHint,
    ) -> Result<(ExtractedDocument, String), FoundryError> {
        let extractor = self.dispatch(content_type, hint).ok_or_else(|| {
            FoundryError::new(
                ErrorCode::ParseError,
                format!("no extractor accepts content type {content_type:?} (hint {hint:?})"),
            )
        })?;
        debug!(
            target: "idf.extract",
            decoder = extractor.name(),
            content_type,
            "dispatching extraction"
        );
        let document = extractor.extract(data)?;
        Ok((document, format!("{}/{}", extractor.name(), extractor.version())))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Built-in decoders
// ---------------------------------------------------------------------------

fn essence(content_type: Option<&str>) -> Option<&str> {
    content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim())
}

/// UTF-8 (lossy) passthrough; the fallback for any text-ish payload.
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn can_handle(&self, content_type: Option<&str>, hint: FormatHint) -> bool {
        match hint {
            FormatHint::Txt | FormatHint::Csv | FormatHint::Json => return true,
            FormatHint::Auto => {}
            _ => return false,
        }
        matches!(
            essence(content_type),
            None | Some("text/plain") | Some("text/csv") | Some("application/json")
        )
    }

    fn extract(&self, data: &[u8]) -> Result<ExtractedDocument, FoundryError> {
        Ok(ExtractedDocument::Flat {
            text: String::from_utf8_lossy(data).into_owned(),
            title: None,
        })
    }
}

/// Markdown passthrough that lifts the first ATX heading as the title.
pub struct MarkdownExtractor;

impl DocumentExtractor for MarkdownExtractor {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn can_handle(&self, content_type: Option<&str>, hint: FormatHint) -> bool {
        match hint {
            FormatHint::Markdown => return true,
            FormatHint::Auto => {}
            _ => return false,
        }
        matches!(essence(content_type), Some("text/markdown"))
    }

    fn extract(&self, data: &[u8]) -> Result<ExtractedDocument, FoundryError> {
        let text = String::from_utf8_lossy(data).into_owned();
        let title = text.lines().find_map(|line| {
            let hashes = line.bytes().take_while(|b| *b == b'#').count();
            ((1..=6).contains(&hashes) && line.as_bytes().get(hashes) == Some(&b' '))
                .then(|| line[hashes..].trim().to_string())
        });
        Ok(ExtractedDocument::Flat { text, title })
    }
}

/// Tag-stripping HTML decoder: drops `<script>`/`<style>` bodies, decodes
/// the common entities, collapses runs of blank lines, and lifts `<title>`.
pub struct HtmlExtractor;

impl DocumentExtractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html-strip"
    }

    fn can_handle(&self, content_type: Option<&str>, hint: FormatHint) -> bool {
        match hint {
            FormatHint::Html => return true,
            FormatHint::Auto => {}
            _ => return false,
        }
        matches!(
            essence(content_type),
            Some("text/html") | Some("application/xhtml+xml")
        )
    }

    fn extract(&self, data: &[u8]) -> Result<ExtractedDocument, FoundryError> {
        let html = String::from_utf8_lossy(data);
        let title = between_ci(&html, "<title", "</title>")
            .map(|t| t.trim_start_matches(|c| c != '>').trim_start_matches('>').trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(ExtractedDocument::Flat {
            text: strip_tags(&html),
            title,
        })
    }
}

/// Crude PDF text-layer scan: collects literal strings from the raw bytes.
///
/// This is deliberately shallow.  Layout-aware rendering and OCR are
/// external decoders registered by the embedding application; this built-in
/// only recovers what an uncompressed text layer exposes.
pub struct PdfTextScanExtractor;

impl DocumentExtractor for PdfTextScanExtractor {
    fn name(&self) -> &'static str {
        "pdf-textscan"
    }

    fn can_handle(&self, content_type: Option<&str>, hint: FormatHint) -> bool {
        match hint {
            FormatHint::Pdf => return true,
            FormatHint::Auto => {}
            _ => return false,
        }
        matches!(essence(content_type), Some("application/pdf"))
    }

    fn extract(&self, data: &[u8]) -> Result<ExtractedDocument, FoundryError> {
        if !data.starts_with(b"%PDF") {
            return Err(FoundryError::new(
                ErrorCode::ParseError,
                "payload does not carry a %PDF magic header",
            ));
        }
        let text = scan_pdf_literals(data);
        Ok(ExtractedDocument::Paged {
            pages: vec![PageRecord::new(1, text)],
            title: None,
        })
    }
}

fn scan_pdf_literals(data: &[u8]) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut escape = false;
    for &byte in data {
        if depth > 0 {
            if escape {
                escape = false;
                match byte {
                    b'n' => out.push('\n'),
                    b'(' | b')' | b'\\' => out.push(byte as char),
                    _ => {}
                }
                continue;
            }
            match byte {
                b'\\' => escape = true,
                b'(' => {
                    depth += 1;
                    out.push('(');
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        out.push(' ');
                    } else {
                        out.push(')');
                    }
                }
                b if b.is_ascii_graphic() || b == b' ' || b == b'\n' => out.push(b as char),
                _ => {}
            }
        } else if byte == b'(' {
            depth = 1;
        }
    }
    out.trim().to_string()
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    while !rest.is_empty() {
        if let Some(close) = skip_until {
            match find_ci(rest, close) {
                Some(idx) => {
                    rest = &rest[idx + close.len()..];
                    skip_until = None;
                }
                None => break,
            }
            continue;
        }
        let Some(c) = rest.chars().next() else { break };
        if in_tag {
            if c == '>' {
                in_tag = false;
            }
            rest = &rest[c.len_utf8()..];
            continue;
        }
        if c == '<' {
            let lower = rest.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
            if lower.starts_with("<script") {
                skip_until = Some("</script>");
            } else if lower.starts_with("<style") {
                skip_until = Some("</style>");
            } else {
                // Block-level closers read as line breaks in the text form.
                if lower.starts_with("</p>")
                    || lower.starts_with("<br")
                    || lower.starts_with("</div")
                    || lower.starts_with("</h")
                    || lower.starts_with("</li")
                {
                    out.push('\n');
                }
                in_tag = true;
            }
            rest = &rest[1..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    collapse_blank_lines(&decode_entities(&out))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(trimmed);
    }
    out
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let lower = haystack.to_ascii_lowercase();
    lower.find(&needle.to_ascii_lowercase())
}

fn between_ci<'a>(haystack: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = find_ci(haystack, open)?;
    let rest = &haystack[start..];
    let end = find_ci(rest, close)?;
    Some(&rest[open.len()..end])
}
