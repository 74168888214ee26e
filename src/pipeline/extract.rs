//! Text extraction: PDF and DOCX bytes → plain text.
//!
//! Each binary format is handled by a [`TextExtractor`]. Extractors are
//! synchronous and may block (pdfium is a C++ library with thread-local
//! state), so [`crate::pipeline::input`] always calls them through
//! `tokio::task::spawn_blocking`.
//!
//! An extractor returning `Ok("")` is not an error: it means the document
//! parsed but has no text layer. The caller turns that into an extraction
//! warning. `Err` is reserved for documents that cannot be parsed at all.

use crate::error::GraderError;
use pdfium_render::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// A blocking bytes → text capability for one document format.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, GraderError>;
}

/// The extraction strategy for each binary format the pipeline accepts.
///
/// Plain text needs no strategy: it is decoded as UTF-8 in place.
#[derive(Clone)]
pub struct Extractors {
    pub pdf: Arc<dyn TextExtractor>,
    pub docx: Arc<dyn TextExtractor>,
}

impl Extractors {
    /// pdfium for PDF (system library, or `library_path` when given) and the
    /// built-in reader for DOCX.
    pub fn new(pdfium_library_path: Option<PathBuf>) -> Self {
        Self {
            pdf: Arc::new(PdfiumExtractor::new(pdfium_library_path)),
            docx: Arc::new(DocxExtractor),
        }
    }
}

impl Default for Extractors {
    fn default() -> Self {
        Self::new(None)
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Reads the text layer of every page via pdfium.
///
/// Scanned documents have no text layer and come back empty.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, GraderError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| GraderError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, GraderError> {
        let pdfium = self.bind()?;

        let document =
            pdfium
                .load_pdf_from_byte_slice(bytes, None)
                .map_err(|e| GraderError::CorruptDocument {
                    kind: "PDF".into(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        let mut text = String::new();
        for (idx, page) in pages.iter().enumerate() {
            let page_text = page.text().map_err(|e| GraderError::CorruptDocument {
                kind: "PDF".into(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;
            if idx > 0 {
                text.push_str("\n\n");
            }
            text.push_str(&page_text.all());
        }

        debug!("PDF text layer: {} pages, {} chars", pages.len(), text.len());
        Ok(text)
    }
}

// ── DOCX ─────────────────────────────────────────────────────────────────

/// Reads the raw text of `word/document.xml` inside a DOCX archive.
///
/// Paragraphs are separated by a blank line; `<w:tab/>` becomes a tab and
/// `<w:br/>`/`<w:cr/>` a newline. Formatting, headers and footers are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

const DOCX_BODY_PART: &str = "word/document.xml";

impl TextExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, GraderError> {
        let corrupt = |detail: String| GraderError::CorruptDocument {
            kind: "DOCX".into(),
            detail,
        };

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| corrupt(format!("not a zip archive: {e}")))?;
        let mut part = archive
            .by_name(DOCX_BODY_PART)
            .map_err(|e| corrupt(format!("{DOCX_BODY_PART}: {e}")))?;
        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| corrupt(format!("{DOCX_BODY_PART}: {e}")))?;

        let text = document_xml_to_text(&xml).map_err(corrupt)?;
        debug!("DOCX body: {} chars", text.len());
        Ok(text)
    }
}

/// Walk WordprocessingML and collect run text.
fn document_xml_to_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_run = false;
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_text_run = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            // Tab stops in paragraph properties are also `w:tab`; only run content counts.
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" if in_run => current.push('\t'),
                b"w:br" | b"w:cr" if in_run => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| format!("bad text at {}: {e}", reader.buffer_position()))?;
                current.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML error at {}: {e}", reader.buffer_position())),
            _ => {}
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n\n"))
}
