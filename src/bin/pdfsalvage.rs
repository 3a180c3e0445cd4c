//! CLI binary for pdfsalvage.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, writes the extracted images and the diagnostic JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfsalvage::{
    extract, ExtractionConfig, ExtractionProgress, ExtractionResult, ProgressCallback, TierKind,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Percentage bar driven by the library's `(percent, status)` updates.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgress for CliProgress {
    fn on_progress(&self, percent: f32, status: &str) {
        self.bar.set_position(percent.round() as u64);
        self.bar.set_message(status.to_string());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract images next to the input
  pdfsalvage scan.pdf

  # Choose the output directory and keep the diagnostic report
  pdfsalvage scan.pdf -o images/ --diagnostic scan.diagnostic.json

  # Use a remote extraction service as the second tier
  pdfsalvage --remote https://extract.example.com/api/extract scan.pdf

  # Skip the background worker entirely
  pdfsalvage --degraded-only scan.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  PDFSALVAGE_REMOTE_URL   Remote extraction endpoint (same as --remote)
  RUST_LOG                Log filter, e.g. pdfsalvage=debug
"#;

#[derive(Parser, Debug)]
#[command(
    name = "pdfsalvage",
    version,
    about = "Extract images from PDF files, repairing and falling back as needed",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to extract images from.
    input: PathBuf,

    /// Directory for extracted images. Default: `<input stem>_images`.
    #[arg(short, long, env = "PDFSALVAGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the diagnostic record (JSON) here, on success and on failure.
    #[arg(long)]
    diagnostic: Option<PathBuf>,

    /// Remote extraction endpoint used as the second tier.
    #[arg(long, env = "PDFSALVAGE_REMOTE_URL")]
    remote: Option<String>,

    /// Remote request timeout in seconds.
    #[arg(long, default_value_t = 90)]
    remote_timeout: u64,

    /// Rasterization DPI for documents without embedded images.
    #[arg(long, default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page ceiling for local extraction.
    #[arg(long, default_value_t = 500)]
    max_pages: usize,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium: Option<PathBuf>,

    /// Only run inline (no background worker) strategies.
    #[arg(long)]
    degraded_only: bool,

    #[arg(long)]
    no_progress: bool,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read '{}'", cli.input.display()))?;
    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.input.display().to_string());

    let progress = show_progress.then(CliProgress::new);
    let config = build_config(&cli, progress.clone().map(|p| p as ProgressCallback))?;

    let outcome = extract(bytes, &filename, &config).await;
    if let Some(p) = &progress {
        p.finish();
    }

    match outcome {
        Ok(result) => {
            let out_dir = cli
                .output
                .clone()
                .unwrap_or_else(|| default_output_dir(&cli.input));
            write_images(&result, &out_dir).await?;
            if let Some(path) = &cli.diagnostic {
                write_diagnostic(path, &result.diagnostic.to_json_pretty()?).await?;
            }
            if !cli.quiet {
                eprintln!(
                    "{}  {} image(s) from {} page(s) via {} tier  {}ms  →  {}",
                    green("✔"),
                    bold(&result.items.len().to_string()),
                    result.page_count,
                    result.tier,
                    result.diagnostic.total_duration_ms.unwrap_or(0),
                    bold(&out_dir.display().to_string()),
                );
                if let Some(method) = &result.diagnostic.auto_repair_used {
                    eprintln!("   {}", dim(&format!("recovered with {method}")));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if let Some(path) = &cli.diagnostic {
                write_diagnostic(path, &err.diagnostic.to_json_pretty()?).await?;
            }
            eprintln!("{} {} {}", red("✘"), bold(err.kind.as_str()), err.user_message());
            eprintln!("   {}", dim(&err.message));
            for hint in err.recommendations() {
                eprintln!("   • {hint}");
            }
            if cli.diagnostic.is_none() {
                eprintln!(
                    "   {}",
                    dim("re-run with --diagnostic report.json to keep the full record")
                );
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let tiers = if cli.degraded_only {
        vec![TierKind::DegradedLocal]
    } else {
        TierKind::DEFAULT_PLAN.to_vec()
    };

    let mut builder = ExtractionConfig::builder()
        .raster_dpi(cli.dpi)
        .max_pages(cli.max_pages)
        .remote_timeout_secs(cli.remote_timeout)
        .tiers(tiers);
    if let Some(url) = &cli.remote {
        builder = builder.remote_endpoint(url.clone());
    }
    if let Some(path) = &cli.pdfium {
        builder = builder.pdfium_library_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    input.with_file_name(format!("{stem}_images"))
}

async fn write_images(result: &ExtractionResult, dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create '{}'", dir.display()))?;
    for item in &result.items {
        let path = dir.join(&item.filename);
        tokio::fs::write(&path, &item.data)
            .await
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
    }
    Ok(())
}

async fn write_diagnostic(path: &Path, json: &str) -> Result<()> {
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write diagnostic '{}'", path.display()))
}
