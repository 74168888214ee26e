//! # essay-grader
//!
//! Grade essays against DSE-style rubrics with a generative model.
//!
//! The crate does no scoring of its own. It turns a submission (pasted text or
//! a PDF/DOCX/plain-text upload) into essay text, sends that text with a fixed
//! persona, rubric and output schema to a model, and hands back the validated
//! report. A report that breaks the schema or a numeric range is rejected, not
//! patched.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Submission
//!  │
//!  ├─ 1. Input     pasted text wins; else dispatch the upload by type
//!  ├─ 2. Extract   PDF via pdfium, DOCX via its XML body (spawn_blocking)
//!  ├─ 3. Clean     line endings, invisible chars, blank-line runs
//!  ├─ 4. Model     one call: Gemini REST with a key, else edgequake-llm
//!  └─ 5. Validate  schema + ranges, then attach meta (model, warning)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use essay_grader::{Grader, GraderConfig, Submission};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GraderConfig::builder()
//!         .default_api_key(std::env::var("GOOGLE_GENERATIVE_AI_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let grader = Grader::new(config)?;
//!     let graded = grader
//!         .grade(&Submission::from_text("In the modern world, ..."))
//!         .await?;
//!     println!("{} ({}/100)", graded.report.grade, graded.report.score);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `essay-grader` binary (clap + anyhow + tracing-subscriber) |
//!
//! The HTTP server ([`server::router`]) is part of the library so it can be
//! embedded or driven in tests without the binary.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod grade;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GraderConfig, GraderConfigBuilder};
pub use error::GraderError;
pub use grade::Grader;
pub use pipeline::extract::{Extractors, TextExtractor};
pub use pipeline::input::{DocumentKind, ResolvedEssay, Submission, Upload};
pub use pipeline::llm::{GradingModel, GradingRequest, ModelResolver};
pub use report::{GradeReport, GradedEssay, ReportMeta, Rubric};
