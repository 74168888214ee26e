//! Pipeline stages for grading a submission.
//!
//! Each submodule implements exactly one step, so each is testable alone and
//! the I/O-bound pieces (pdfium, the model) sit behind traits that tests can
//! replace.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ normalise ──▶ llm ──▶ report
//! (form)    (pdf/docx)   (cleanup)    (model)  (validated)
//! ```
//!
//! 1. [`input`]     — pick the essay text: pasted text wins, else the upload,
//!    dispatched on declared type then extension
//! 2. [`extract`]   — PDF/DOCX bytes to text; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`normalise`] — deterministic cleanup of extracted text and of model
//!    replies before parsing
//! 4. [`llm`]       — one grading call per request, then schema and range
//!    validation; the only stage with network I/O
//! 5. [`gemini`]    — the Gemini REST back-end used when a credential is known

pub mod extract;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod normalise;
