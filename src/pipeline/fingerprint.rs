//! Content hash, format version and header/trailer checks.
//!
//! Never fails: an invalid header is reported in the [`Fingerprint`] and the
//! caller decides whether to attempt repair.

use crate::diagnostic::{method, AttemptEntry, DiagnosticRecord};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Instant;

pub const PDF_MAGIC: &[u8] = b"%PDF-";
pub const EOF_MARKER: &[u8] = b"%%EOF";

/// Bytes scanned for the version token.
const VERSION_SCAN: usize = 20;
/// Bytes shown in the header preview.
const HEADER_PREVIEW: usize = 8;
/// Window at either end of the buffer searched for magic/trailer.
pub const SEARCH_WINDOW: usize = 1024;

static RE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"%PDF-(\d+\.\d+)").unwrap());

/// What validation learned about a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub sha256: String,
    pub version: Option<String>,
    /// Printable rendering of the first bytes, `.` for anything else.
    pub header: String,
    pub header_valid: bool,
    pub trailer_present: bool,
}

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            sha256: content_hash(bytes),
            version: detect_version(bytes),
            header: header_preview(bytes),
            header_valid: bytes.starts_with(PDF_MAGIC),
            trailer_present: has_trailer(bytes),
        }
    }

    pub fn needs_repair(&self) -> bool {
        !self.header_valid || !self.trailer_present
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn detect_version(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(VERSION_SCAN)];
    RE_VERSION
        .captures(head)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

pub fn header_preview(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(HEADER_PREVIEW)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// `%%EOF` within the last [`SEARCH_WINDOW`] bytes.
pub fn has_trailer(bytes: &[u8]) -> bool {
    let tail = &bytes[bytes.len().saturating_sub(SEARCH_WINDOW)..];
    find_subsequence(tail, EOF_MARKER).is_some()
}

pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Fingerprint `bytes`, fill the record and append a `header_validation` entry.
pub fn validate(bytes: &[u8], record: &mut DiagnosticRecord) -> Fingerprint {
    let started = Instant::now();
    let fp = Fingerprint::of(bytes);

    record.file_hash = Some(fp.sha256.clone());
    record.pdf_version = fp.version.clone();
    record.header_bytes = Some(fp.header.clone());

    let details = json!({
        "header": fp.header,
        "version": fp.version,
        "trailerPresent": fp.trailer_present,
    });
    let entry = if fp.header_valid {
        AttemptEntry::succeeded(method::HEADER_VALIDATION, started.elapsed())
    } else {
        AttemptEntry::failed(
            method::HEADER_VALIDATION,
            started.elapsed(),
            format!("missing %PDF- header, found {:?}", fp.header),
        )
    };
    record.record(entry.with_details(details));
    fp
}
