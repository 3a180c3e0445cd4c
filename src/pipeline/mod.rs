//! Pipeline stages for image extraction.
//!
//! Each submodule implements exactly one step. The tier controller in
//! [`crate::extract`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! fingerprint ──▶ repair ──▶ load ──▶ acquire ──▶ encode
//! (hash/header)  (bytes)   (chain)  (pages)     (PNG/JPEG)
//!                              └───▶ remote (tier 2, original bytes)
//! ```
//!
//! 1. [`fingerprint`] : hash, version token, header and trailer checks
//! 2. [`repair`]      : strip leading junk, append a missing trailer
//! 3. [`load`]        : ordered load strategies (strictness × worker/inline)
//! 4. [`acquire`]     : embedded pass, then rasterization if nothing found;
//!    runs inside `spawn_blocking` because pdfium is not async-safe
//! 5. [`encode`]      : memory-aware PNG/JPEG encoding
//! 6. [`remote`]      : multipart upload to the remote extraction service

pub mod acquire;
pub mod encode;
pub mod fingerprint;
pub mod load;
pub mod remote;
pub mod repair;

use crate::config::ExtractionConfig;
use crate::diagnostic::DiagnosticRecord;
use crate::error::RunError;
use crate::output::ItemNamer;
use crate::progress::ProgressTracker;

/// Mutable state of one run, moved into and back out of blocking tasks.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub record: DiagnosticRecord,
    pub progress: ProgressTracker,
    pub namer: ItemNamer,
    pub config: ExtractionConfig,
}

impl RunContext {
    pub fn new(record: DiagnosticRecord, config: &ExtractionConfig) -> Self {
        let namer = ItemNamer::new(&record.file_name, &record.session_id);
        Self {
            progress: ProgressTracker::new(config.progress_callback.clone()),
            namer,
            config: config.clone(),
            record,
        }
    }

    pub fn check_cancelled(&self) -> Result<(), RunError> {
        if self.config.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}
