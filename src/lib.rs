//! # pdfsalvage
//!
//! Extract raster images from PDF documents, including damaged ones, and
//! explain exactly what happened when it doesn't work.
//!
//! ## Why this crate?
//!
//! Real-world PDFs arrive with junk before the header, missing trailers,
//! parser-hostile structures and password protection, and the machines that
//! process them are not always able to run a background parser thread.
//! Instead of one load attempt and a generic failure, every run walks an
//! ordered set of load strategies and execution tiers, records each attempt,
//! and returns either the images or a classified error with a full
//! diagnostic record and recommendations.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Precheck     size ceiling, .pdf extension
//!  ├─ 2. Fingerprint  SHA-256, version token, header/trailer checks
//!  ├─ 3. Repair       strip leading junk, append missing %%EOF
//!  ├─ 4. Tiers        local (worker → inline) → remote → degraded local
//!  │     ├─ Load      strict/lenient/minimal × worker/no-worker
//!  │     └─ Acquire   embedded-image pages, else rasterize every page
//!  └─ 5. Result       items + diagnostic record, or classified error
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfsalvage::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("scan.pdf")?;
//!     match extract(bytes, "scan.pdf", &ExtractionConfig::default()).await {
//!         Ok(result) => println!("{} images", result.items.len()),
//!         Err(err) => {
//!             eprintln!("{}: {}", err.kind, err.user_message());
//!             eprintln!("{}", err.diagnostic.to_json_pretty()?);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfsalvage` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfsalvage = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDFium
//!
//! The default engine binds pdfium at runtime: `PDFIUM_LIB_PATH`, then the
//! current directory, then the system library path. Inject any other
//! [`engine::PdfEngine`] with [`ExtractionConfigBuilder::engine`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod recommend;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, TierKind};
pub use diagnostic::{AttemptEntry, DiagnosticRecord};
pub use engine::{EngineError, LoadedDocument, PdfEngine, PdfiumEngine, Strictness};
pub use error::{ConfigError, ErrorKind, ExtractionError, RunError};
pub use extract::{extract, extract_file, extract_sync};
pub use output::{ExtractedItem, ExtractionResult, ImageFormat, ItemSource};
pub use progress::{CancelFlag, ExtractionProgress, NoopProgress, ProgressCallback};
