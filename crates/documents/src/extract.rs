//! Plain-text extraction from stored documents.
//!
//! The format is chosen from the declared MIME type and the file name, in
//! priority order: PDF, DOCX, the text family, then a best-effort decode of
//! anything else. Extraction never fails past this module: unreadable input
//! yields `None`.

use tracing::{debug, warn};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Non-`text/*` types that are still plain text.
const TEXT_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/yaml",
    "application/x-yaml",
];

/// How a document's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Pdf,
    Docx,
    Text,
    Binary,
}

impl ContentKind {
    /// Pick the extraction strategy for a document.
    pub fn classify(declared_mime: Option<&str>, filename: &str) -> Self {
        let mime = declared_mime
            .and_then(|m| m.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let filename = filename.to_ascii_lowercase();

        if mime == "application/pdf" || filename.ends_with(".pdf") {
            Self::Pdf
        } else if mime == DOCX_MIME || filename.ends_with(".docx") {
            Self::Docx
        } else if mime.starts_with("text/") || TEXT_APPLICATION_TYPES.contains(&mime.as_str()) {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

/// Converts raw document bytes into plain text.
#[derive(Debug, Clone, Copy)]
pub struct TextExtractor {
    /// Leading bytes scanned for NUL when decoding unknown content.
    pub sniff_len: usize,
    /// Largest share of replacement/control characters an unknown blob may contain.
    pub max_garbage_ratio: f64,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self {
            sniff_len: 8 * 1024,
            max_garbage_ratio: 0.10,
        }
    }
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract text, or `None` when the document has no usable text.
    pub fn extract(&self, bytes: &[u8], declared_mime: Option<&str>, filename: &str) -> Option<String> {
        let kind = ContentKind::classify(declared_mime, filename);
        debug!(file = %filename, ?kind, size = bytes.len(), "Extracting text");

        match kind {
            ContentKind::Pdf => extract_pdf(bytes, filename),
            ContentKind::Docx => extract_docx(bytes, filename),
            ContentKind::Text => Some(decode_text(bytes)),
            ContentKind::Binary => self.extract_unknown(bytes),
        }
    }

    /// Run [`extract`](Self::extract) on the blocking pool.
    ///
    /// A parser panic is logged and reported as `None`.
    pub async fn extract_blocking(
        &self,
        bytes: Vec<u8>,
        declared_mime: Option<String>,
        filename: String,
    ) -> Option<String> {
        let extractor = *self;
        let name = filename.clone();
        run_isolated(&name, move || extractor.extract(&bytes, declared_mime.as_deref(), &filename)).await
    }

    fn extract_unknown(&self, bytes: &[u8]) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }

        let head = &bytes[..bytes.len().min(self.sniff_len)];
        if head.contains(&0) {
            return None;
        }

        let text = decode_text(bytes);
        let total = text.chars().count();
        if total == 0 {
            return None;
        }

        let garbage = text
            .chars()
            .filter(|c| *c == char::REPLACEMENT_CHARACTER || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')))
            .count();

        if garbage as f64 / total as f64 > self.max_garbage_ratio {
            return None;
        }
        Some(text)
    }
}

/// Lossy UTF-8 decode with any byte-order mark removed.
fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&*text).to_string()
}

/// Run an extraction job on the blocking pool. A panicking job is logged
/// and reported as `None`.
async fn run_isolated<F>(filename: &str, job: F) -> Option<String>
where
    F: FnOnce() -> Option<String> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(text) => text,
        Err(e) => {
            warn!(file = %filename, error = %e, "Text extraction task failed");
            None
        }
    }
}

fn extract_pdf(bytes: &[u8], filename: &str) -> Option<String> {
    let document = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(file = %filename, error = %e, "Failed to load PDF");
            return None;
        }
    };

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(file = %filename, page = page_number, error = %e, "Failed to extract PDF page");
                return None;
            }
        }
    }

    Some(pages.join("\n"))
}

fn extract_docx(bytes: &[u8], filename: &str) -> Option<String> {
    let docx = match docx_rs::read_docx(bytes) {
        Ok(docx) => docx,
        Err(e) => {
            warn!(file = %filename, error = %e, "Failed to read DOCX");
            return None;
        }
    };

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                let mut line = String::new();
                paragraph_text(p, &mut line);
                lines.push(line);
            }
            docx_rs::DocumentChild::Table(table) => table_lines(table, &mut lines),
            _ => {}
        }
    }

    Some(lines.join("\n"))
}

fn paragraph_text(p: &docx_rs::Paragraph, out: &mut String) {
    for child in &p.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => run_text(run, out),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = inner {
                        run_text(run, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn run_text(run: &docx_rs::Run, out: &mut String) {
    for child in &run.children {
        match child {
            docx_rs::RunChild::Text(t) => out.push_str(&t.text),
            docx_rs::RunChild::Tab(_) => out.push('\t'),
            docx_rs::RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

/// One `cell | cell` line per table row.
fn table_lines(table: &docx_rs::Table, lines: &mut Vec<String>) {
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        let cells: Vec<String> = tr
            .cells
            .iter()
            .map(|cell| {
                let docx_rs::TableRowChild::TableCell(tc) = cell;
                let mut text = String::new();
                for content in &tc.children {
                    if let docx_rs::TableCellContent::Paragraph(p) = content {
                        paragraph_text(p, &mut text);
                    }
                }
                text.trim().to_string()
            })
            .collect();
        if !cells.is_empty() {
            lines.push(cells.join(" | "));
        }
    }
}
