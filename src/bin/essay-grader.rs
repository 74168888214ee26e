//! CLI binary for essay-grader.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `grade` pushes one essay through the same pipeline and prints the report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use essay_grader::server;
use essay_grader::{GradedEssay, Grader, GraderConfig, Submission, Upload};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the web service (widget at http://127.0.0.1:3000/)
  essay-grader serve

  # Listen on all interfaces
  essay-grader serve --bind 0.0.0.0:8080

  # Grade a document
  essay-grader grade essay.pdf
  essay-grader grade essay.docx --json > report.json

  # Grade pasted text with a one-off key
  essay-grader grade --text "In the modern world, ..." --api-key AIza...

ENVIRONMENT VARIABLES:
  GOOGLE_GENERATIVE_AI_API_KEY  Server-default Gemini key (request keys win)
  ESSAY_GRADER_MODEL            Model ID (default: gemini-1.5-flash)
  ESSAY_GRADER_API_BASE         Gemini REST base URL
  ESSAY_GRADER_PROVIDER         edgequake-llm provider used when no key is known
  ESSAY_GRADER_BIND             Listen address for `serve`
  PDFIUM_LIB_PATH               Path to libpdfium (default: system library)
  RUST_LOG                      Log filter, e.g. essay_grader=debug
"#;

/// Grade essays against a DSE-style rubric with a generative model.
#[derive(Parser, Debug)]
#[command(
    name = "essay-grader",
    version,
    about = "Grade essays against a DSE-style rubric with a generative model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: ConfigArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "ESSAY_GRADER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "ESSAY_GRADER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the grading endpoint and the browser widget.
    Serve {
        /// Listen address.
        #[arg(long, env = "ESSAY_GRADER_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },

    /// Grade one essay from a file or from text.
    Grade {
        /// PDF, DOCX or plain-text file.
        #[arg(required_unless_present = "text")]
        file: Option<PathBuf>,

        /// Essay text. Takes precedence over FILE.
        #[arg(long)]
        text: Option<String>,

        /// Gemini API key for this request only.
        #[arg(long)]
        api_key: Option<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Model ID.
    #[arg(long, global = true, env = "ESSAY_GRADER_MODEL")]
    model: Option<String>,

    /// Server-default Gemini API key.
    #[arg(long, global = true, env = "GOOGLE_GENERATIVE_AI_API_KEY", hide_env_values = true)]
    default_api_key: Option<String>,

    /// Gemini REST base URL.
    #[arg(long, global = true, env = "ESSAY_GRADER_API_BASE")]
    api_base: Option<String>,

    /// edgequake-llm provider used when no key is known.
    #[arg(long, global = true, env = "ESSAY_GRADER_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "ESSAY_GRADER_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max output tokens for one report.
    #[arg(long, global = true, env = "ESSAY_GRADER_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Upload ceiling in bytes.
    #[arg(long, global = true, env = "ESSAY_GRADER_MAX_UPLOAD")]
    max_upload: Option<usize>,

    /// Model call timeout in seconds (default: none).
    #[arg(long, global = true, env = "ESSAY_GRADER_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Path to libpdfium.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        match cli.command {
            Command::Serve { .. } => "info",
            // The spinner covers progress for one-shot grading.
            Command::Grade { .. } => "warn",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.config)?;
    let grader = Grader::new(config).context("Failed to initialise grader")?;

    match cli.command {
        Command::Serve { bind } => {
            if !cli.quiet {
                eprintln!("{} Essay grader on {}", green("◆"), bold(&format!("http://{bind}/")));
            }
            server::serve(bind, Arc::new(grader))
                .await
                .context("Server failed")?;
        }
        Command::Grade {
            file,
            text,
            api_key,
            json,
        } => {
            let mut submission = Submission {
                text,
                ..Submission::default()
            };
            if let Some(path) = file {
                let upload = Upload::from_path(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                submission.upload = Some(upload);
            }
            submission.api_key = api_key;

            let progress = (!cli.quiet && !json).then(grading_spinner);
            let result = grader.grade(&submission).await;
            if let Some(bar) = progress {
                bar.finish_and_clear();
            }
            let graded = result.context("Grading failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&graded).context("Failed to serialise report")?
                );
            } else {
                print_report(&graded);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `GraderConfig`.
fn build_config(args: &ConfigArgs) -> Result<GraderConfig> {
    let mut builder = GraderConfig::builder();
    if let Some(ref m) = args.model {
        builder = builder.model(m);
    }
    if let Some(ref k) = args.default_api_key {
        builder = builder.default_api_key(k);
    }
    if let Some(ref u) = args.api_base {
        builder = builder.api_base_url(u);
    }
    if let Some(ref p) = args.provider {
        builder = builder.fallback_provider(p);
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_output_tokens(n);
    }
    if let Some(n) = args.max_upload {
        builder = builder.max_upload_bytes(n);
    }
    if let Some(s) = args.api_timeout {
        builder = builder.api_timeout_secs(s);
    }
    if let Some(ref p) = args.pdfium_lib_path {
        builder = builder.pdfium_library_path(p.clone());
    }
    builder.build().context("Invalid configuration")
}

fn grading_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Grading");
    bar.set_message("waiting for the model…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn print_report(graded: &GradedEssay) {
    let r = &graded.report;
    println!(
        "{}  {}/100  {}",
        bold(&r.grade),
        r.score,
        dim(&format!("DSE level {}", r.level))
    );
    println!();
    println!("{}", r.summary);

    println!();
    println!("{}", bold("Strengths"));
    for s in &r.strengths {
        println!("  {} {}", green("+"), s);
    }

    println!();
    println!("{}", bold("Improvements"));
    for s in &r.improvements {
        println!("  {} {}", yellow("-"), s);
    }

    println!();
    println!("{}", bold("Rubric"));
    for (name, score) in r.rubric.scores() {
        println!("  {:<14} {:>4}/10", name, score);
    }
    if !r.rubric.comments.is_empty() {
        println!("  {}", dim(&r.rubric.comments));
    }

    if !r.inline_feedback.is_empty() {
        println!();
        println!("{}", bold("Inline feedback"));
        println!("{}", r.inline_feedback);
    }

    println!();
    eprintln!("{}", dim(&format!("model: {}", graded.meta.model)));
}
