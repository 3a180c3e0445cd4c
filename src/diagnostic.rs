//! Append-only record of everything one extraction run attempted.
//!
//! A [`DiagnosticRecord`] is created when a run starts, threaded by `&mut`
//! through every stage, and handed back to the caller on both the success and
//! the failure path. Attempts can only be appended; there is no API to remove
//! or reorder them, so the list always reflects execution order.
//!
//! The serde field names are the export schema: the record is written
//! verbatim as the downloadable postmortem JSON, and the remote extraction
//! service speaks the same shape.

use crate::error::ErrorKind;
use crate::recommend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Method tags used in [`AttemptEntry::method`].
pub mod method {
    pub const HEADER_VALIDATION: &str = "header_validation";
    pub const REPAIR_STRIP_LEADING_JUNK: &str = "repair_strip_leading_junk";
    pub const REPAIR_APPEND_TRAILER: &str = "repair_append_trailer";
    pub const EMBEDDED_EXTRACTION: &str = "embedded_extraction";
    pub const PAGE_RASTERIZATION: &str = "page_rasterization";
    pub const PAGE_RENDER: &str = "page_render";
    pub const REMOTE_EXTRACTION: &str = "remote_extraction";
    pub const TIER_LOCAL: &str = "tier_local";
    pub const TIER_REMOTE: &str = "tier_remote";
    pub const TIER_DEGRADED_LOCAL: &str = "tier_degraded_local";
    /// Load attempts are tagged `load_<strategy>`, e.g. `load_strict_worker`.
    pub const LOAD_PREFIX: &str = "load_";
}

/// One row per strategy tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEntry {
    pub method: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AttemptEntry {
    fn new(method: impl Into<String>, success: bool, duration: Duration) -> Self {
        let elapsed =
            chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            method: method.into(),
            success,
            error: None,
            stack: None,
            details: None,
            timestamp: Utc::now() - elapsed,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn succeeded(method: impl Into<String>, duration: Duration) -> Self {
        Self::new(method, true, duration)
    }

    pub fn failed(method: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        let mut entry = Self::new(method, false, duration);
        entry.error = Some(error.into());
        entry
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The structured, exportable log of one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_hash: Option<String>,
    pub pdf_version: Option<String>,
    pub header_bytes: Option<String>,
    pub page_count: Option<usize>,
    pub image_count: usize,
    attempts: Vec<AttemptEntry>,
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: Option<u64>,
    pub error_code: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub auto_repair_used: Option<String>,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl DiagnosticRecord {
    /// Start a fresh record with a new session id.
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            file_size,
            file_hash: None,
            pdf_version: None,
            header_bytes: None,
            page_count: None,
            image_count: 0,
            attempts: Vec::new(),
            started_at: Utc::now(),
            total_duration_ms: None,
            error_code: None,
            error_message: None,
            stack_trace: None,
            recommendations: Vec::new(),
            auto_repair_used: None,
            clock: Some(Instant::now()),
        }
    }

    /// Append one attempt.
    pub fn record(&mut self, entry: AttemptEntry) {
        tracing::debug!(
            method = %entry.method,
            success = entry.success,
            duration_ms = entry.duration_ms,
            "attempt recorded"
        );
        self.attempts.push(entry);
    }

    /// Time `f` and record its outcome under `method`.
    pub fn attempt<T, E: std::fmt::Display>(
        &mut self,
        method: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let started = Instant::now();
        let result = f();
        let entry = match &result {
            Ok(_) => AttemptEntry::succeeded(method, started.elapsed()),
            Err(e) => AttemptEntry::failed(method, started.elapsed(), e.to_string()),
        };
        self.record(entry);
        result
    }

    /// Attempts in execution order.
    pub fn attempts(&self) -> &[AttemptEntry] {
        &self.attempts
    }

    /// Method tags in execution order.
    pub fn attempt_methods(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.method.as_str()).collect()
    }

    /// Most recent attempt with the given method tag.
    pub fn last_attempt(&self, method: &str) -> Option<&AttemptEntry> {
        self.attempts.iter().rev().find(|a| a.method == method)
    }

    /// Load-strategy attempts only.
    pub fn load_attempts(&self) -> impl Iterator<Item = &AttemptEntry> {
        self.attempts
            .iter()
            .filter(|a| a.method.starts_with(method::LOAD_PREFIX))
    }

    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    fn stamp_duration(&mut self) {
        let elapsed = match self.clock {
            Some(start) => start.elapsed().as_millis() as u64,
            None => (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
        };
        self.total_duration_ms = Some(elapsed);
    }

    pub fn finalize_success(&mut self, image_count: usize) {
        self.image_count = image_count;
        self.stamp_duration();
    }

    /// Stamp the terminal error and generate recommendations.
    pub fn finalize_failure(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        stack: Option<String>,
    ) {
        self.error_code = Some(kind);
        self.error_message = Some(message.into());
        self.stack_trace = stack;
        self.stamp_duration();
        self.recommendations = recommend::recommendations(kind, self);
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
