//! Error types for the pdfsalvage library.
//!
//! Three layers, from the inside out:
//!
//! * [`crate::engine::EngineError`]: what the parser said about one open or
//!   one page.
//! * [`RunError`]: why one tier of a run stopped. The tier controller looks
//!   at [`RunError::is_environmental`] to decide whether the next tier gets a
//!   chance.
//! * [`ExtractionError`]: the single, fully classified failure handed back to
//!   the caller. It always carries the finalized
//!   [`DiagnosticRecord`](crate::diagnostic::DiagnosticRecord), so callers
//!   never need to reconstruct context.
//!
//! [`ErrorKind`] is the closed, machine-readable taxonomy shared by all of
//! them and by the remote service's `diagnostic.errorCode`.

use crate::diagnostic::DiagnosticRecord;
use crate::engine::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FileTooLarge,
    NotPdf,
    InvalidPdf,
    PdfEncrypted,
    PdfLoadFailed,
    TooManyPages,
    NoImages,
    AllMethodsFailed,
    UnknownError,
    /// The caller cancelled the run.
    Cancelled,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::FileTooLarge,
        ErrorKind::NotPdf,
        ErrorKind::InvalidPdf,
        ErrorKind::PdfEncrypted,
        ErrorKind::PdfLoadFailed,
        ErrorKind::TooManyPages,
        ErrorKind::NoImages,
        ErrorKind::AllMethodsFailed,
        ErrorKind::UnknownError,
        ErrorKind::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::NotPdf => "NOT_PDF",
            ErrorKind::InvalidPdf => "INVALID_PDF",
            ErrorKind::PdfEncrypted => "PDF_ENCRYPTED",
            ErrorKind::PdfLoadFailed => "PDF_LOAD_FAILED",
            ErrorKind::TooManyPages => "TOO_MANY_PAGES",
            ErrorKind::NoImages => "NO_IMAGES",
            ErrorKind::AllMethodsFailed => "ALL_METHODS_FAILED",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Parse a wire code such as `"NO_IMAGES"`.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == code)
    }

    /// Kinds that describe the document itself. Retrying elsewhere does not
    /// change the answer.
    pub fn is_content_related(&self) -> bool {
        matches!(
            self,
            ErrorKind::FileTooLarge
                | ErrorKind::NotPdf
                | ErrorKind::InvalidPdf
                | ErrorKind::PdfEncrypted
                | ErrorKind::TooManyPages
                | ErrorKind::NoImages
        )
    }

    /// Human-readable message for end users.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::FileTooLarge => "The file is larger than the maximum supported size.",
            ErrorKind::NotPdf => "The file does not appear to be a PDF document.",
            ErrorKind::InvalidPdf => {
                "The file is not a valid PDF and could not be repaired automatically."
            }
            ErrorKind::PdfEncrypted => {
                "The PDF is password protected. Remove the password and try again."
            }
            ErrorKind::PdfLoadFailed => "The PDF could not be opened by any loading method.",
            ErrorKind::TooManyPages => "The PDF has more pages than can be processed.",
            ErrorKind::NoImages => "No images were found in the PDF.",
            ErrorKind::AllMethodsFailed => "Every extraction method failed for this PDF.",
            ErrorKind::UnknownError => "An unexpected error occurred during extraction.",
            ErrorKind::Cancelled => "The extraction was cancelled.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one tier (or the prechecks) stopped.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    // ── Prechecks ─────────────────────────────────────────────────────────
    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("'{filename}' does not have a .pdf extension")]
    NotPdf { filename: String },

    #[error("missing %PDF- header (first bytes: {header:?})")]
    InvalidPdf { header: String },

    // ── Local tiers ───────────────────────────────────────────────────────
    #[error("document is password protected (reported by {method})")]
    Encrypted { method: String },

    /// Every load strategy failed.
    #[error("all {attempts} load strategies failed; last error: {last}")]
    LoadFailed {
        attempts: usize,
        last: EngineError,
        /// At least one strategy failed because of the environment rather
        /// than the document.
        environmental: bool,
    },

    #[error("document has {count} pages, limit is {limit}")]
    TooManyPages { count: usize, limit: usize },

    #[error("no images found on any of {pages} pages")]
    NoImages { pages: usize },

    // ── Remote tier ───────────────────────────────────────────────────────
    /// The remote service classified the document.
    #[error("remote service rejected the document ({kind}): {message}")]
    RemoteRejected { kind: ErrorKind, message: String },

    #[error("remote service unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    // ── Controller ────────────────────────────────────────────────────────
    #[error("all {tiers} execution tiers failed; last error: {last}")]
    Exhausted {
        tiers: usize,
        last: String,
        /// Panic text of the last tier, when it crashed.
        stack: Option<String>,
    },

    #[error("extraction cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal {
        message: String,
        stack: Option<String>,
    },
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            RunError::NotPdf { .. } => ErrorKind::NotPdf,
            RunError::InvalidPdf { .. } => ErrorKind::InvalidPdf,
            RunError::Encrypted { .. } => ErrorKind::PdfEncrypted,
            RunError::LoadFailed { .. } => ErrorKind::PdfLoadFailed,
            RunError::TooManyPages { .. } => ErrorKind::TooManyPages,
            RunError::NoImages { .. } => ErrorKind::NoImages,
            RunError::RemoteRejected { kind, .. } => *kind,
            RunError::RemoteUnavailable { .. } | RunError::Exhausted { .. } => {
                ErrorKind::AllMethodsFailed
            }
            RunError::Cancelled => ErrorKind::Cancelled,
            RunError::Internal { .. } => ErrorKind::UnknownError,
        }
    }

    /// `true` when the next execution tier might succeed where this one
    /// failed.
    pub fn is_environmental(&self) -> bool {
        match self {
            RunError::LoadFailed { environmental, .. } => *environmental,
            RunError::RemoteUnavailable { .. } | RunError::Internal { .. } => true,
            _ => false,
        }
    }

    pub fn stack(&self) -> Option<&str> {
        match self {
            RunError::Internal { stack, .. } | RunError::Exhausted { stack, .. } => {
                stack.as_deref()
            }
            _ => None,
        }
    }
}

impl From<EngineError> for RunError {
    /// Single-shot conversion for errors outside the load chain.
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Encrypted => RunError::Encrypted {
                method: "engine".into(),
            },
            other => {
                let environmental = other.is_environmental();
                RunError::LoadFailed {
                    attempts: 1,
                    last: other,
                    environmental,
                }
            }
        }
    }
}

/// Terminal failure of [`crate::extract`].
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ErrorKind,
    pub message: String,
    /// Finalized record, including recommendations.
    pub diagnostic: Box<DiagnosticRecord>,
}

impl ExtractionError {
    /// Finalize `record` with `err` and wrap both.
    pub fn from_run(err: &RunError, mut record: DiagnosticRecord) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        record.finalize_failure(kind, message.clone(), err.stack().map(str::to_string));
        Self {
            kind,
            message,
            diagnostic: Box::new(record),
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn recommendations(&self) -> &[String] {
        &self.diagnostic.recommendations
    }
}

/// Builder validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);
