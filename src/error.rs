//! Error types for the essay-grader library.
//!
//! Every failure of a grading request is a [`GraderError`]. The variants fall
//! into two groups that the HTTP boundary treats differently:
//!
//! * **Client input errors** — nothing usable was submitted (no text, an
//!   unsupported or oversized file, a malformed form body). No model call is
//!   made and the caller gets a `400` with the message text.
//!
//! * **Server errors** — extraction, provider, or validation failures. The
//!   caller gets a `500` carrying the underlying message. No partial report is
//!   ever returned alongside one of these.
//!
//! [`GraderError::is_client_error`] is the single place that classification
//! lives.

use thiserror::Error;

/// All errors returned by the essay-grader library.
#[derive(Debug, Error)]
pub enum GraderError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The uploaded file's declared type and extension are both unrecognised.
    #[error("Unsupported file type. Please upload PDF or DOCX.")]
    UnsupportedFileType {
        declared: Option<String>,
        file_name: String,
    },

    /// Neither the pasted text nor the uploaded file produced any essay text.
    ///
    /// `warning` is set when a PDF or DOCX was recognised but came back empty.
    #[error("No essay text found. Upload a PDF/DOCX with text or paste your essay.")]
    NoEssayText { warning: Option<String> },

    /// The uploaded file exceeds the configured ceiling.
    #[error("File too large. Please keep under {}.", size_label(.limit))]
    FileTooLarge { size: usize, limit: usize },

    /// The request body could not be read as a submission form.
    #[error("Invalid submission: {detail}")]
    InvalidSubmission { detail: String, payload_too_large: bool },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// A PDF or DOCX was recognised but could not be parsed.
    #[error("Failed to read {kind} document: {detail}")]
    CorruptDocument { kind: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The fallback provider could not be built (missing key, unknown name).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The provider rejected the credential (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The provider returned an error or the call failed in transit.
    #[error("Model '{model}' request failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ProviderError {
        model: String,
        status: Option<u16>,
        message: String,
    },

    /// The call succeeded but carried no content to parse.
    #[error("Model '{model}' returned an empty response")]
    EmptyResponse { model: String },

    /// The model's output did not match the report schema.
    #[error("Model output failed schema validation: {detail}")]
    SchemaViolation { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GraderError {
    /// True for errors caused by what the caller submitted.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GraderError::UnsupportedFileType { .. }
                | GraderError::NoEssayText { .. }
                | GraderError::FileTooLarge { .. }
                | GraderError::InvalidSubmission { .. }
        )
    }

    /// The extraction warning attached to a [`GraderError::NoEssayText`], if any.
    pub fn extraction_warning(&self) -> Option<&str> {
        match self {
            GraderError::NoEssayText { warning } => warning.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GraderError {
    fn from(err: serde_json::Error) -> Self {
        GraderError::SchemaViolation {
            detail: err.to_string(),
        }
    }
}

/// Whole MB when the limit reaches one, else KB, else bytes.
fn size_label(bytes: &usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    match *bytes {
        n if n >= MIB => format!("{}MB", n / MIB),
        n if n >= KIB => format!("{}KB", n / KIB),
        n => format!("{n} bytes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_essay_text_display() {
        let e = GraderError::NoEssayText { warning: None };
        assert!(e.to_string().contains("No essay text found"));
        assert!(e.is_client_error());
    }

    #[test]
    fn unsupported_display() {
        let e = GraderError::UnsupportedFileType {
            declared: Some("image/png".into()),
            file_name: "scan.png".into(),
        };
        assert!(e.to_string().contains("Unsupported file type"));
        assert!(e.is_client_error());
    }

    #[test]
    fn file_too_large_display() {
        let e = GraderError::FileTooLarge {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        assert!(e.to_string().contains("10MB"), "got: {e}");
    }

    #[test]
    fn file_too_large_display_below_one_mb() {
        let e = GraderError::FileTooLarge {
            size: 600 * 1024,
            limit: 512 * 1024,
        };
        assert_eq!(e.to_string(), "File too large. Please keep under 512KB.");
        let e = GraderError::FileTooLarge { size: 32, limit: 16 };
        assert_eq!(e.to_string(), "File too large. Please keep under 16 bytes.");
    }

    #[test]
    fn provider_error_display_with_status() {
        let e = GraderError::ProviderError {
            model: "gemini-1.5-flash".into(),
            status: Some(503),
            message: "overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 503"), "got: {msg}");
        assert!(msg.contains("overloaded"));
        assert!(!e.is_client_error());
    }

    #[test]
    fn provider_error_display_without_status() {
        let e = GraderError::ProviderError {
            model: "gemini-1.5-flash".into(),
            status: None,
            message: "connection reset".into(),
        };
        assert!(!e.to_string().contains("HTTP"));
    }

    #[test]
    fn warning_only_on_no_text() {
        let e = GraderError::NoEssayText {
            warning: Some("DOCX appears empty.".into()),
        };
        assert_eq!(e.extraction_warning(), Some("DOCX appears empty."));
        let e = GraderError::Internal("x".into());
        assert_eq!(e.extraction_warning(), None);
    }

    #[test]
    fn schema_violation_is_server_error() {
        let e = GraderError::SchemaViolation {
            detail: "rubric.content = 11 is outside 0–10".into(),
        };
        assert!(!e.is_client_error());
        assert!(e.to_string().contains("rubric.content"));
    }
}
