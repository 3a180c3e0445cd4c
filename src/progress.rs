//! Progress reporting and run cancellation.
//!
//! Inject an [`Arc<dyn ExtractionProgress>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! `(percent, status)` updates. Any `Fn(f32, &str) + Send + Sync` closure
//! works as a callback.
//!
//! The overall 0–100 scale is split into fixed stages ([`Stage`]). Inside a
//! run, reports go through a [`ProgressTracker`] which clamps them so the
//! caller never sees the percentage go backwards, even when a fallback tier
//! repeats work an earlier tier already reported on.
//!
//! # Example
//!
//! ```rust
//! use pdfsalvage::{ExtractionConfig, ProgressCallback};
//! use std::sync::Arc;
//!
//! let callback: ProgressCallback = Arc::new(|percent: f32, status: &str| {
//!     eprintln!("{percent:>5.1}%  {status}");
//! });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(callback)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress updates for one extraction run.
pub trait ExtractionProgress: Send + Sync {
    /// `percent` is in `0.0..=100.0` and never decreases within a run.
    fn on_progress(&self, percent: f32, status: &str);
}

impl<F> ExtractionProgress for F
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn on_progress(&self, percent: f32, status: &str) {
        self(percent, status)
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl ExtractionProgress for NoopProgress {
    fn on_progress(&self, _percent: f32, _status: &str) {}
}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgress>;

/// A disjoint slice of the overall progress scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub start: f32,
    pub end: f32,
}

impl Stage {
    pub const VALIDATION: Stage = Stage::new(0.0, 5.0);
    pub const LOAD: Stage = Stage::new(5.0, 25.0);
    pub const EMBEDDED_SCAN: Stage = Stage::new(25.0, 70.0);
    pub const RASTERIZE: Stage = Stage::new(70.0, 95.0);
    /// Tiers after the first report inside this window.
    pub const FALLBACK: Stage = Stage::new(70.0, 95.0);
    pub const FINALIZE: Stage = Stage::new(95.0, 100.0);

    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Position after `done` of `total` units of work in this stage.
    pub fn at(&self, done: usize, total: usize) -> f32 {
        if total == 0 {
            return self.start;
        }
        let fraction = (done.min(total) as f32) / (total as f32);
        self.start + fraction * (self.end - self.start)
    }
}

/// Per-run progress state. Not shared between runs.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    last: f32,
    window: Option<Stage>,
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: 0.0,
            window: None,
        }
    }

    /// Squeeze all further reports into `window` (used by fallback tiers).
    pub fn enter_window(&mut self, window: Stage) {
        self.window = Some(window);
    }

    pub fn leave_window(&mut self) {
        self.window = None;
    }

    /// Highest percentage reported so far.
    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn report(&mut self, percent: f32, status: impl AsRef<str>) {
        let mapped = match self.window {
            Some(w) => w.start + (percent.clamp(0.0, 100.0) / 100.0) * (w.end - w.start),
            None => percent.clamp(0.0, 100.0),
        };
        let value = mapped.max(self.last);
        self.last = value;
        if let Some(cb) = &self.callback {
            cb.on_progress(value, status.as_ref());
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callback", &self.callback.as_ref().map(|_| "<dyn ExtractionProgress>"))
            .field("last", &self.last)
            .field("window", &self.window)
            .finish()
    }
}

/// Cooperative cancellation flag for a run.
///
/// Checked before each load-strategy attempt and between pages; a render
/// already in progress is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
