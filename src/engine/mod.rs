//! Parsing/rendering abstraction over the PDF library.
//!
//! The pipeline never talks to pdfium directly. It talks to a [`PdfEngine`],
//! which lends a [`LoadedDocument`] to a caller-supplied scope and releases
//! the native handle when the scope returns. Because the handle only exists
//! inside that scope, every exit path (success, content error, cancellation,
//! unwinding) releases it without explicit teardown calls.
//!
//! Failures are typed ([`EngineError`]) so the load-strategy chain and the
//! tier controller can tell an encrypted file from a missing background
//! worker without sniffing message text. [`EngineError::from_message`] is the
//! one place where free text is still inspected, for backends that only
//! surface strings.

pub mod pdfium;
pub mod worker;

use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use pdfium::PdfiumEngine;

// ── Errors ───────────────────────────────────────────────────────────────

/// Failure reported by a [`PdfEngine`] or a [`LoadedDocument`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The document requires a password.
    #[error("document is password protected")]
    Encrypted,

    /// The background worker thread could not be started or stopped answering.
    #[error("background worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The parser library itself could not be initialised (missing shared
    /// library, failed binding).
    #[error("PDF engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The parser rejected the document.
    #[error("failed to parse document: {0}")]
    ParseFailed(String),

    /// A single page could not be fetched or rendered.
    #[error("page {page}: {detail}")]
    PageFailed { page: usize, detail: String },
}

static RE_ENCRYPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)password|encrypt|security handler").unwrap());
static RE_WORKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bworker\b|\bthread\b").unwrap());

impl EngineError {
    /// `true` when the failure says something about the execution
    /// environment rather than about the document.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            EngineError::WorkerUnavailable(_) | EngineError::EngineUnavailable(_)
        )
    }

    /// Classify an untyped error message from a third-party parser.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if RE_ENCRYPTION.is_match(&message) {
            EngineError::Encrypted
        } else if RE_WORKER.is_match(&message) {
            EngineError::WorkerUnavailable(message)
        } else {
            EngineError::ParseFailed(message)
        }
    }
}

// ── Load options ─────────────────────────────────────────────────────────

/// How forgiving the parser should be when opening a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Fail fast: at least one page, and every page must be fetchable on open.
    Strict,
    /// Accept whatever the parser recovers.
    Lenient,
    /// Lenient, with form data and annotations left out of renders.
    Minimal,
}

impl Strictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Lenient => "lenient",
            Strictness::Minimal => "minimal",
        }
    }

    /// Whether renders should include form fields and annotations.
    pub fn renders_full_features(&self) -> bool {
        !matches!(self, Strictness::Minimal)
    }
}

/// Physical page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Pixel dimensions of a render at `scale` pixels per point.
    pub fn pixels_at(&self, scale: f32) -> (u32, u32) {
        let w = (self.width * scale).round().max(1.0) as u32;
        let h = (self.height * scale).round().max(1.0) as u32;
        (w, h)
    }
}

// ── Traits ───────────────────────────────────────────────────────────────

/// A parsed, navigable document lent out by a [`PdfEngine`].
///
/// Page indices are 0-based. Implementations are not expected to be
/// thread-safe; a document is only ever used from the thread that opened it
/// (see [`worker`] for how a background thread owns one).
pub trait LoadedDocument {
    fn page_count(&self) -> usize;

    /// Format version as reported by the parser, e.g. `"1.7"`.
    fn version(&self) -> Option<String> {
        None
    }

    /// Explicit encryption metadata, for parsers that open protected files
    /// without a password but still flag them.
    fn is_encrypted(&self) -> bool {
        false
    }

    fn page_size(&mut self, index: usize) -> Result<PageSize, EngineError>;

    /// Number of image paint operations on the page.
    fn image_operator_count(&mut self, index: usize) -> Result<usize, EngineError>;

    /// Render the whole page at `scale` pixels per point.
    fn render_page(&mut self, index: usize, scale: f32) -> Result<DynamicImage, EngineError>;
}

/// A PDF parser/renderer.
pub trait PdfEngine: Send + Sync {
    /// Short identifier used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Called on a freshly spawned worker thread before [`PdfEngine::open`].
    ///
    /// Engines that need per-thread setup (or that cannot run off the main
    /// thread at all) report [`EngineError::WorkerUnavailable`] here.
    fn prepare_worker(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Parse `bytes` and lend the document to `scope`.
    ///
    /// The document is released before this returns. `scope` is called at
    /// most once, and only when parsing succeeded.
    fn open(
        &self,
        bytes: &[u8],
        strictness: Strictness,
        scope: &mut dyn FnMut(&mut dyn LoadedDocument),
    ) -> Result<(), EngineError>;
}

/// Open a document on the current thread and run `f` against it.
pub fn with_document<T>(
    engine: &dyn PdfEngine,
    bytes: &[u8],
    strictness: Strictness,
    f: impl FnOnce(&mut dyn LoadedDocument) -> T,
) -> Result<T, EngineError> {
    let mut f = Some(f);
    let mut output = None;
    engine.open(bytes, strictness, &mut |doc: &mut dyn LoadedDocument| {
        if let Some(f) = f.take() {
            output = Some(f(doc));
        }
    })?;
    output.ok_or_else(|| {
        EngineError::ParseFailed(format!(
            "engine '{}' returned without lending the document",
            engine.name()
        ))
    })
}
