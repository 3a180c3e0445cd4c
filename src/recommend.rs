//! Canned, actionable hints attached to a failed run.

use crate::diagnostic::{method, DiagnosticRecord};
use crate::error::ErrorKind;

/// Highest format version the local engine is known to handle well.
const NEWEST_WELL_SUPPORTED: (u32, u32) = (1, 7);

/// 1–4 hints for `kind`, refined by what `record` shows was tried.
pub fn recommendations(kind: ErrorKind, record: &DiagnosticRecord) -> Vec<String> {
    let mut hints: Vec<String> = match kind {
        ErrorKind::FileTooLarge => vec![
            "Split the PDF into smaller parts and process them separately.".into(),
            "Compress or downsample embedded images before uploading.".into(),
        ],
        ErrorKind::NotPdf => vec![
            "Make sure the file has a .pdf extension and really is a PDF.".into(),
            "If the file was converted from another format, export it to PDF again.".into(),
        ],
        ErrorKind::InvalidPdf => vec![
            "The file header is damaged. Re-download or re-export the PDF.".into(),
            "Try opening and re-saving the file in a PDF viewer.".into(),
        ],
        ErrorKind::PdfEncrypted => vec![
            "Remove the password protection (for example with qpdf --decrypt) and try again."
                .into(),
            "Ask the document owner for an unprotected copy.".into(),
        ],
        ErrorKind::PdfLoadFailed => vec![
            "Open the PDF in a viewer and use \"Save as\" or \"Print to PDF\" to rebuild it."
                .into(),
        ],
        ErrorKind::TooManyPages => vec![
            "Split the document into smaller page ranges.".into(),
            "Extract only the pages that contain the images you need.".into(),
        ],
        ErrorKind::NoImages => vec![
            "The document may contain only text or vector graphics.".into(),
            "If images are visible in a viewer, try printing the document to a new PDF."
                .into(),
        ],
        ErrorKind::AllMethodsFailed => vec![
            "Every extraction method failed. Try again later.".into(),
            "Re-save the PDF with a different application and retry.".into(),
            "Attach the diagnostic report when contacting support.".into(),
        ],
        ErrorKind::UnknownError => vec![
            "Retry the extraction.".into(),
            "Attach the diagnostic report when contacting support.".into(),
        ],
        ErrorKind::Cancelled => vec!["Start the extraction again when ready.".into()],
    };

    if kind == ErrorKind::PdfLoadFailed {
        let header_failed = record
            .last_attempt(method::HEADER_VALIDATION)
            .is_some_and(|a| !a.success);
        if header_failed {
            hints.push(
                "The file header was damaged and had to be repaired; the original may be truncated."
                    .into(),
            );
        }
        if record.pdf_version.as_deref().is_some_and(is_newer_than_supported) {
            hints.push(format!(
                "The document uses PDF {}; saving it as PDF 1.7 or earlier may help.",
                record.pdf_version.as_deref().unwrap_or_default()
            ));
        }
        hints.push("Attach the diagnostic report when contacting support.".into());
    }

    hints.truncate(4);
    hints
}

fn is_newer_than_supported(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().ok());
    match (parts.next().flatten(), parts.next().flatten()) {
        (Some(major), Some(minor)) => (major, minor) > NEWEST_WELL_SUPPORTED,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::AttemptEntry;
    use std::time::Duration;

    #[test]
    fn every_kind_gets_one_to_four_hints() {
        let record = DiagnosticRecord::new("a.pdf", 1);
        for kind in ErrorKind::ALL {
            let hints = recommendations(kind, &record);
            assert!((1..=4).contains(&hints.len()), "{kind}: {hints:?}");
        }
    }

    #[test]
    fn load_failure_mentions_header_damage_and_version() {
        let mut record = DiagnosticRecord::new("a.pdf", 1);
        record.record(AttemptEntry::failed(
            method::HEADER_VALIDATION,
            Duration::ZERO,
            "missing header",
        ));
        record.pdf_version = Some("2.0".into());

        let hints = recommendations(ErrorKind::PdfLoadFailed, &record);
        assert!(hints.iter().any(|h| h.contains("header")));
        assert!(hints.iter().any(|h| h.contains("PDF 2.0")));
        assert!(hints.len() <= 4);
    }

    #[test]
    fn load_failure_without_extra_signals() {
        let mut record = DiagnosticRecord::new("a.pdf", 1);
        record.record(AttemptEntry::succeeded(method::HEADER_VALIDATION, Duration::ZERO));
        record.pdf_version = Some("1.4".into());

        let hints = recommendations(ErrorKind::PdfLoadFailed, &record);
        assert!(!hints.iter().any(|h| h.contains("header")));
        assert!(!hints.iter().any(|h| h.contains("PDF 1.4")));
    }

    #[test]
    fn version_comparison() {
        assert!(is_newer_than_supported("2.0"));
        assert!(is_newer_than_supported("1.8"));
        assert!(!is_newer_than_supported("1.7"));
        assert!(!is_newer_than_supported("garbage"));
    }
}
