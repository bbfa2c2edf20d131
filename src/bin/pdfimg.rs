//! CLI binary for edgequake-pdfimg.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessConfig` and prints results.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use edgequake_pdfimg::{
    api_key_from_env, process_batch, BatchReport, FileOutcome, ProcessConfig,
    ProcessProgressCallback, ProgressCallback, TinifyClient, DEFAULT_API_BASE_URL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn human_bytes(n: u64) -> String {
    match n {
        n if n >= 1 << 20 => format!("{:.1} MB", n as f64 / (1u64 << 20) as f64),
        n if n >= 1 << 10 => format!("{:.1} KB", n as f64 / 1024.0),
        n => format!("{n} B"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: a bar over the batch's files, with one line
/// per document event and per image printed above it.
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Images written for the current document.
    images: AtomicUsize,
    /// Of those, how many fell back to the original bytes.
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    /// Length is set by `on_batch_start`.
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            images: AtomicUsize::new(0),
            fallbacks: AtomicUsize::new(0),
        })
    }
}

impl ProcessProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} files…"))
        ));
    }

    fn on_file_start(&self, path: &Path) {
        self.images.store(0, Ordering::SeqCst);
        self.fallbacks.store(0, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(truncate(&name, 40));
        self.bar
            .println(format!("{} {}", cyan("▸"), bold(&path.display().to_string())));
    }

    fn on_file_skipped(&self, path: &Path, reason: &str) {
        self.bar.println(format!(
            "{} {}  {}",
            dim("–"),
            path.display(),
            dim(&format!("skipped: {reason}"))
        ));
        self.bar.inc(1);
    }

    fn on_image_written(&self, file_name: &str, bytes: usize, compressed: bool) {
        self.images.fetch_add(1, Ordering::SeqCst);
        if compressed {
            self.bar.println(format!(
                "  {} {:<24}  {}",
                green("✓"),
                file_name,
                dim(&human_bytes(bytes as u64))
            ));
        } else {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!(
                "  {} {:<24}  {}",
                cyan("⚠"),
                file_name,
                dim(&format!("{}  (uncompressed)", human_bytes(bytes as u64)))
            ));
        }
    }

    fn on_file_complete(&self, _path: &Path, outcome: &FileOutcome) {
        let images = self.images.load(Ordering::SeqCst);
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        let folder = outcome
            .folder()
            .map(|f| f.display().to_string())
            .unwrap_or_default();

        let line = match outcome {
            FileOutcome::LeftInFolder { document, .. } => format!(
                "  {} {} images  →  {}\n    {}",
                cyan("⚠"),
                images,
                bold(&folder),
                cyan(&format!(
                    "a file with this name already exists; PDF left at {}",
                    document.display()
                )),
            ),
            FileOutcome::SkippedNoImages { .. } => {
                format!("  {} {}", dim("–"), dim(outcome.label()))
            }
            _ => format!(
                "  {} {} images  →  {}{}",
                green("✔"),
                images,
                bold(&folder),
                if fallbacks > 0 {
                    dim(&format!("  ({fallbacks} uncompressed)"))
                } else {
                    String::new()
                },
            ),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_file_error(&self, path: &Path, error: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            path.display(),
            red(&truncate(error, 120))
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_files: usize, _failed: usize) {
        // The summary follows on stderr.
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One document: creates ./1.2.3/ with page*_img*.* and 1.2.3.md
  pdfimg 1.2.3.pdf

  # Several documents, machine-readable report
  pdfimg --json 4.1\ Intro.pdf 4.2\ Methods.pdf > report.json

NAMING:
  Only files whose names start with digits and dots are processed; that
  prefix (e.g. "4.1.2" from "4.1.2 Lecture.pdf") names the output folder,
  created next to the PDF. Other files are skipped.

ENVIRONMENT VARIABLES:
  TINYPNG_API_KEY   TinyPNG API key (required)
  TINIFY_API_URL    Override the API endpoint
  RUST_LOG          Override log filtering (e.g. edgequake_pdfimg=debug)

SETUP:
  1. Get a key:   https://tinypng.com/developers
  2. Export it:   export TINYPNG_API_KEY=...
  3. Run:         pdfimg 1.2.3.pdf
"#;

/// Extract, compress and catalogue the embedded images of PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "pdfimg",
    version,
    about = "Extract, compress and catalogue the embedded images of PDF documents",
    long_about = "Move each numbered PDF into a folder named after its numeric prefix, \
extract every embedded image, compress it with TinyPNG (falling back to the original \
bytes on any failure), write a Markdown note embedding the images, and move the PDF back.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to process.
    inputs: Vec<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFIMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFIMG_QUIET")]
    quiet: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "PDFIMG_JSON")]
    json: bool,

    /// Per-request compression timeout in seconds.
    #[arg(long, env = "PDFIMG_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Tinify API base URL.
    #[arg(long, env = "TINIFY_API_URL", default_value = DEFAULT_API_BASE_URL, hide = true)]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Per-file lines come from the progress callback; library INFO logs
    // would only duplicate them.
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Credential (before anything else) ────────────────────────────────
    let api_key = api_key_from_env().context("Cannot start without a TinyPNG API key")?;

    if cli.inputs.is_empty() {
        Cli::command()
            .print_help()
            .context("Failed to print usage")?;
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ProcessProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, api_key, progress_cb)?;
    let client = TinifyClient::new(&config).context("Failed to create TinyPNG client")?;

    // ── Run batch ────────────────────────────────────────────────────────
    let report = process_batch(&cli.inputs, &client, &config).await;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `ProcessConfig`.
fn build_config(
    cli: &Cli,
    api_key: String,
    progress: Option<ProgressCallback>,
) -> Result<ProcessConfig> {
    let mut builder = ProcessConfig::builder()
        .api_key(api_key)
        .api_base_url(cli.api_url.clone())
        .api_timeout_secs(cli.api_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &BatchReport) {
    let total = report.files.len();
    let failed = report.failed_count();
    let skipped = report.skipped_count();
    let done = total - failed - skipped;

    eprintln!(
        "{} {}/{} files processed  ({} skipped, {} failed)",
        if failed == 0 {
            green("✔")
        } else if failed == total {
            red("✘")
        } else {
            cyan("⚠")
        },
        bold(&done.to_string()),
        total,
        skipped,
        if failed == 0 {
            failed.to_string()
        } else {
            red(&failed.to_string())
        },
    );

    let written = report.images_written();
    if written > 0 {
        eprintln!(
            "   {} images ({} compressed)  {}  →  {}",
            written,
            report.images_compressed(),
            dim(&human_bytes(report.original_bytes())),
            dim(&human_bytes(report.written_bytes())),
        );
    }
}
