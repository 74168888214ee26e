//! Input resolution: turn a submission into the essay text to grade.
//!
//! ## Resolution order
//!
//! 1. Non-empty pasted text wins outright; any uploaded file is ignored.
//! 2. Otherwise the upload's [`DocumentKind`] is detected. Unrecognised kinds
//!    are rejected before a single byte is parsed.
//! 3. PDF and DOCX bytes go through their [`TextExtractor`] on the blocking
//!    pool; plain text is decoded as UTF-8.
//! 4. An empty result is [`GraderError::NoEssayText`], carrying a warning
//!    when a PDF/DOCX parsed but held no text.
//!
//! ## Media type precedence
//!
//! The declared media type is checked first. The filename extension is only
//! consulted when the declared type is absent, `application/octet-stream`,
//! or not one of the recognised types.

use crate::error::GraderError;
use crate::pipeline::extract::{Extractors, TextExtractor};
use crate::pipeline::normalise::clean_document_text;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Declared type of a DOCX upload.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Warning returned when a PDF has no selectable text.
pub const PDF_EMPTY_WARNING: &str = "No selectable text found in PDF. If this is a scanned document, please paste your essay text directly for best results.";

/// Warning returned when a DOCX has no text.
pub const DOCX_EMPTY_WARNING: &str =
    "DOCX appears empty. Please ensure it contains text, or paste your essay directly.";

/// One grading request, as received from the form or the CLI.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Pasted essay text.
    pub text: Option<String>,
    /// Uploaded document.
    pub upload: Option<Upload>,
    /// Caller-supplied model credential.
    pub api_key: Option<String>,
}

impl Submission {
    /// A submission of pasted text only.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A submission of one uploaded document only.
    pub fn from_upload(upload: Upload) -> Self {
        Self {
            upload: Some(upload),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// The caller's credential, if it is non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// An uploaded document: raw bytes plus what the client said about them.
#[derive(Clone, Default)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Size as received. Larger than `bytes.len()` when the content was
    /// discarded for exceeding the upload ceiling.
    pub size: usize,
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("size", &self.size)
            .finish()
    }
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            size: bytes.len(),
            bytes,
        }
    }

    /// An upload whose content was dropped on receipt; only its size is kept.
    pub fn discarded(
        file_name: impl Into<String>,
        content_type: Option<String>,
        size: usize,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes: Vec::new(),
            size,
        }
    }

    /// Read a local file; the declared type is left empty so detection falls
    /// back to the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, GraderError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GraderError::Internal(format!("Failed to read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(file_name, None, bytes))
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::detect(self.content_type.as_deref(), &self.file_name)
    }
}

/// The document formats the pipeline can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "PDF"),
            DocumentKind::Docx => write!(f, "DOCX"),
            DocumentKind::PlainText => write!(f, "text"),
        }
    }
}

impl DocumentKind {
    /// Classify by declared media type alone.
    ///
    /// Parameters are ignored (`text/plain; charset=utf-8` is `text/plain`).
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/pdf" {
            return Some(Self::Pdf);
        }
        if essence == DOCX_MIME {
            return Some(Self::Docx);
        }
        if essence.starts_with("text/") {
            return Some(Self::PlainText);
        }
        None
    }

    /// Classify by filename extension alone (case-insensitive).
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name)
            .extension()?
            .to_string_lossy()
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Declared type first; extension only when the declared type is missing
    /// or unrecognised.
    pub fn detect(declared: Option<&str>, file_name: &str) -> Option<Self> {
        declared
            .and_then(Self::from_mime_type)
            .or_else(|| Self::from_extension(file_name))
    }
}

/// The essay text a submission resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEssay {
    /// Non-empty, trimmed essay text.
    pub text: String,
    /// Where the text came from.
    pub source: EssaySource,
}

/// Where a [`ResolvedEssay`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssaySource {
    Pasted,
    Document(DocumentKind),
}

impl fmt::Display for EssaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EssaySource::Pasted => write!(f, "pasted text"),
            EssaySource::Document(kind) => write!(f, "{kind} upload"),
        }
    }
}

/// Resolve a submission to non-empty essay text.
///
/// `max_upload_bytes` is only enforced for an upload that is actually read.
pub async fn resolve_essay(
    submission: &Submission,
    extractors: &Extractors,
    max_upload_bytes: usize,
) -> Result<ResolvedEssay, GraderError> {
    let pasted = submission.text.as_deref().map(trim_essay).unwrap_or_default();
    if !pasted.is_empty() {
        if submission.upload.is_some() {
            debug!("Pasted text present; ignoring uploaded file");
        }
        return Ok(ResolvedEssay {
            text: pasted.to_string(),
            source: EssaySource::Pasted,
        });
    }

    let Some(upload) = submission.upload.as_ref() else {
        return Err(GraderError::NoEssayText { warning: None });
    };

    let kind = upload.kind().ok_or_else(|| GraderError::UnsupportedFileType {
        declared: upload.content_type.clone(),
        file_name: upload.file_name.clone(),
    })?;

    if upload.size > max_upload_bytes || upload.bytes.len() > max_upload_bytes {
        return Err(GraderError::FileTooLarge {
            size: upload.size.max(upload.bytes.len()),
            limit: max_upload_bytes,
        });
    }

    info!(
        "Extracting {} upload '{}' ({} bytes)",
        kind,
        upload.file_name,
        upload.bytes.len()
    );

    let (text, empty_warning) = match kind {
        DocumentKind::Pdf => (
            run_extractor(&extractors.pdf, upload.bytes.clone()).await?,
            PDF_EMPTY_WARNING,
        ),
        DocumentKind::Docx => (
            run_extractor(&extractors.docx, upload.bytes.clone()).await?,
            DOCX_EMPTY_WARNING,
        ),
        DocumentKind::PlainText => {
            let decoded = String::from_utf8_lossy(&upload.bytes);
            let text = trim_essay(&decoded).to_string();
            if text.is_empty() {
                return Err(GraderError::NoEssayText { warning: None });
            }
            return Ok(ResolvedEssay {
                text,
                source: EssaySource::Document(kind),
            });
        }
    };

    let text = clean_document_text(&text);
    if text.is_empty() {
        warn!("{} upload '{}' has no extractable text", kind, upload.file_name);
        return Err(GraderError::NoEssayText {
            warning: Some(empty_warning.to_string()),
        });
    }

    debug!("Extracted {} chars from {} upload", text.len(), kind);
    Ok(ResolvedEssay {
        text,
        source: EssaySource::Document(kind),
    })
}

/// Trim whitespace and byte-order marks from both ends.
fn trim_essay(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
}

/// Run a blocking extractor off the async worker threads.
async fn run_extractor(
    extractor: &Arc<dyn TextExtractor>,
    bytes: Vec<u8>,
) -> Result<String, GraderError> {
    let extractor = Arc::clone(extractor);
    tokio::task::spawn_blocking(move || extractor.extract(&bytes))
        .await
        .map_err(|e| GraderError::Internal(format!("Extraction task panicked: {}", e)))?
}
