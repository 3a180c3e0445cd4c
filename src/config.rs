//! Configuration types for image extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The config is an explicit per-run value: the
//! engine, tier plan and worker settings travel with the call, so concurrent
//! runs with different settings never interfere.

use crate::diagnostic::method;
use crate::engine::{PdfEngine, PdfiumEngine};
use crate::error::ConfigError;
use crate::progress::{CancelFlag, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfsalvage::{ExtractionConfig, TierKind};
///
/// let config = ExtractionConfig::builder()
///     .raster_dpi(150)
///     .max_pages(200)
///     .tiers(vec![TierKind::Local, TierKind::DegradedLocal])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Largest accepted input, in bytes. Default: 200 MiB.
    ///
    /// Checked before any parsing. A buffer of exactly this size passes.
    pub max_file_size: u64,

    /// Page ceiling for the local tiers. Default: 500.
    ///
    /// The remote service enforces its own limit.
    pub max_pages: usize,

    /// Estimated decoded size (`width × height × 4`) above which a render is
    /// scaled down and encoded as JPEG. Default: 50 MiB.
    pub max_image_bytes: u64,

    /// Render scale used when a page contains image operations. Default: 2.0.
    pub embedded_scale: f32,

    /// DPI for the rasterization pass. Range: 72–600. Default: 200.
    pub raster_dpi: u32,

    /// JPEG quality for downgraded renders. Range: 1–100. Default: 90.
    pub lossy_quality: u8,

    /// Reject filenames that do not end in `.pdf`. Default: true.
    pub require_pdf_extension: bool,

    /// Ordered execution tiers. Default: Local, Remote, DegradedLocal.
    pub tiers: Vec<TierKind>,

    /// Endpoint of the remote extraction service. Default: None (tier skipped).
    pub remote_endpoint: Option<String>,

    /// Request timeout for the remote tier in seconds. Default: 90.
    pub remote_timeout_secs: u64,

    /// How long a background worker may take to open a document. Default: 30.
    pub worker_startup_timeout_secs: u64,

    /// Pre-constructed engine. Takes precedence over `pdfium_library_path`.
    pub engine: Option<Arc<dyn PdfEngine>>,

    /// Explicit pdfium shared library location.
    /// If None, `PDFIUM_LIB_PATH`, the current directory and the system path
    /// are searched in that order.
    pub pdfium_library_path: Option<PathBuf>,

    /// Receives `(percent, status)` updates.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation for this run.
    pub cancel: Option<CancelFlag>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_size: 200 * MIB,
            max_pages: 500,
            max_image_bytes: 50 * MIB,
            embedded_scale: 2.0,
            raster_dpi: 200,
            lossy_quality: 90,
            require_pdf_extension: true,
            tiers: TierKind::DEFAULT_PLAN.to_vec(),
            remote_endpoint: None,
            remote_timeout_secs: 90,
            worker_startup_timeout_secs: 30,
            engine: None,
            pdfium_library_path: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("max_file_size", &self.max_file_size)
            .field("max_pages", &self.max_pages)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("embedded_scale", &self.embedded_scale)
            .field("raster_dpi", &self.raster_dpi)
            .field("lossy_quality", &self.lossy_quality)
            .field("require_pdf_extension", &self.require_pdf_extension)
            .field("tiers", &self.tiers)
            .field("remote_endpoint", &self.remote_endpoint)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .field("worker_startup_timeout_secs", &self.worker_startup_timeout_secs)
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgress>"),
            )
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Pixels per point for the rasterization pass (`dpi / 72`).
    pub fn raster_scale(&self) -> f32 {
        self.raster_dpi as f32 / 72.0
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn worker_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_startup_timeout_secs)
    }

    /// The injected engine, or a pdfium engine built from the library settings.
    pub fn resolve_engine(&self) -> Arc<dyn PdfEngine> {
        match (&self.engine, &self.pdfium_library_path) {
            (Some(engine), _) => Arc::clone(engine),
            (None, Some(path)) => Arc::new(PdfiumEngine::with_library_path(path.clone())),
            (None, None) => Arc::new(PdfiumEngine::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes.max(1);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn max_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_image_bytes = bytes.max(4);
        self
    }

    pub fn embedded_scale(mut self, scale: f32) -> Self {
        self.config.embedded_scale = scale.clamp(0.1, 8.0);
        self
    }

    pub fn raster_dpi(mut self, dpi: u32) -> Self {
        self.config.raster_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn lossy_quality(mut self, quality: u8) -> Self {
        self.config.lossy_quality = quality.clamp(1, 100);
        self
    }

    pub fn require_pdf_extension(mut self, v: bool) -> Self {
        self.config.require_pdf_extension = v;
        self
    }

    pub fn tiers(mut self, tiers: Vec<TierKind>) -> Self {
        self.config.tiers = tiers;
        self
    }

    pub fn remote_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.remote_endpoint = Some(url.into());
        self
    }

    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote_timeout_secs = secs.max(1);
        self
    }

    pub fn worker_startup_timeout_secs(mut self, secs: u64) -> Self {
        self.config.worker_startup_timeout_secs = secs.max(1);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn PdfEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ConfigError> {
        let c = &self.config;
        if c.tiers.is_empty() {
            return Err(ConfigError("at least one execution tier is required".into()));
        }
        for (i, tier) in c.tiers.iter().enumerate() {
            if c.tiers[..i].contains(tier) {
                return Err(ConfigError(format!(
                    "tier '{}' appears more than once",
                    tier.name()
                )));
            }
        }
        if let Some(url) = &c.remote_endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError(format!(
                    "remote endpoint must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if !(c.embedded_scale.is_finite() && c.embedded_scale > 0.0) {
            return Err(ConfigError("embedded scale must be positive".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// One step of the execution-tier plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Full load-strategy chain, worker configurations first.
    Local,
    /// POST the original bytes to the remote extraction service.
    Remote,
    /// Inline (no-worker) load strategies only.
    DegradedLocal,
}

impl TierKind {
    pub const DEFAULT_PLAN: [TierKind; 3] =
        [TierKind::Local, TierKind::Remote, TierKind::DegradedLocal];

    pub fn name(&self) -> &'static str {
        match self {
            TierKind::Local => "local",
            TierKind::Remote => "remote",
            TierKind::DegradedLocal => "degraded_local",
        }
    }

    /// Diagnostic method tag recorded when the tier is entered.
    pub fn method(&self) -> &'static str {
        match self {
            TierKind::Local => method::TIER_LOCAL,
            TierKind::Remote => method::TIER_REMOTE,
            TierKind::DegradedLocal => method::TIER_DEGRADED_LOCAL,
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.max_file_size, 200 * 1024 * 1024);
        assert_eq!(c.max_pages, 500);
        assert_eq!(c.max_image_bytes, 50 * 1024 * 1024);
        assert_eq!(c.tiers, TierKind::DEFAULT_PLAN.to_vec());
        assert_eq!(c.remote_timeout(), Duration::from_secs(90));
        assert!((c.raster_scale() - 2.777_78).abs() < 1e-3);
    }

    #[test]
    fn setters_clamp() {
        let c = ExtractionConfig::builder()
            .raster_dpi(10)
            .lossy_quality(0)
            .max_pages(0)
            .build()
            .unwrap();
        assert_eq!(c.raster_dpi, 72);
        assert_eq!(c.lossy_quality, 1);
        assert_eq!(c.max_pages, 1);
    }

    #[test]
    fn rejects_bad_tier_plans() {
        assert!(ExtractionConfig::builder().tiers(vec![]).build().is_err());
        let err = ExtractionConfig::builder()
            .tiers(vec![TierKind::Local, TierKind::Local])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("local"));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(ExtractionConfig::builder()
            .remote_endpoint("ftp://example.com")
            .build()
            .is_err());
        assert!(ExtractionConfig::builder()
            .remote_endpoint("http://127.0.0.1:9/extract")
            .build()
            .is_ok());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = ExtractionConfig::builder()
            .progress_callback(Arc::new(|_p: f32, _s: &str| {}))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn ExtractionProgress>"));
    }
}
