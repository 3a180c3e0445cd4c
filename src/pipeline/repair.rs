//! Byte-level repair of damaged PDF buffers.
//!
//! Two heuristics, applied in order to a progressively repaired copy:
//! strip junk before the `%PDF-` magic, then append a missing `%%EOF`
//! trailer. Neither looks at document structure. The original buffer is
//! never modified.

use super::fingerprint::{find_subsequence, has_trailer, EOF_MARKER, PDF_MAGIC, SEARCH_WINDOW};
use crate::diagnostic::{method, AttemptEntry, DiagnosticRecord};
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

/// Appended when the trailer marker is missing.
pub const TRAILER_PATCH: &[u8] = b"\n%%EOF\n";

/// A repaired copy of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub bytes: Vec<u8>,
    /// Repairs that changed the buffer, in order.
    pub methods: Vec<&'static str>,
}

/// Drop everything before a `%PDF-` found at offset `k > 0` within the first
/// [`SEARCH_WINDOW`] bytes.
pub fn strip_leading_junk(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.starts_with(PDF_MAGIC) {
        return None;
    }
    let head = &bytes[..bytes.len().min(SEARCH_WINDOW)];
    let offset = find_subsequence(head, PDF_MAGIC)?;
    Some(bytes[offset..].to_vec())
}

/// Append [`TRAILER_PATCH`] when no `%%EOF` is present near the end.
pub fn append_trailer(bytes: &[u8]) -> Option<Vec<u8>> {
    if has_trailer(bytes) {
        return None;
    }
    let mut patched = Vec::with_capacity(bytes.len() + TRAILER_PATCH.len());
    patched.extend_from_slice(bytes);
    patched.extend_from_slice(TRAILER_PATCH);
    Some(patched)
}

/// Run both heuristics and record each one.
///
/// Returns `None` when the result still lacks a valid header.
pub fn auto_repair(bytes: &[u8], record: &mut DiagnosticRecord) -> Option<RepairOutcome> {
    let mut current = bytes.to_vec();
    let mut methods = Vec::new();

    if !current.starts_with(PDF_MAGIC) {
        let stripped = record.attempt(method::REPAIR_STRIP_LEADING_JUNK, || {
            strip_leading_junk(&current)
                .ok_or_else(|| format!("no %PDF- marker in the first {SEARCH_WINDOW} bytes"))
        });
        if let Ok(stripped) = stripped {
            info!(
                "Stripped {} leading bytes before %PDF- header",
                current.len() - stripped.len()
            );
            current = stripped;
            methods.push(method::REPAIR_STRIP_LEADING_JUNK);
        }
    }

    let started = Instant::now();
    if let Some(patched) = append_trailer(&current) {
        record.record(
            AttemptEntry::succeeded(method::REPAIR_APPEND_TRAILER, started.elapsed())
                .with_details(json!({ "bytesAppended": TRAILER_PATCH.len() })),
        );
        info!("Appended missing {} trailer", String::from_utf8_lossy(EOF_MARKER));
        current = patched;
        methods.push(method::REPAIR_APPEND_TRAILER);
    }

    if !current.starts_with(PDF_MAGIC) {
        warn!("Auto-repair could not produce a valid PDF header");
        return None;
    }
    if !methods.is_empty() {
        record.auto_repair_used = Some(methods.join("+"));
    }
    Some(RepairOutcome {
        bytes: current,
        methods,
    })
}
