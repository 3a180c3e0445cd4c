//! Extraction entry points and the execution-tier controller.
//!
//! A run is: prechecks → fingerprint → repair (if needed) → the configured
//! tier plan, tried in order. A tier that fails for an environmental reason
//! (no worker thread, no pdfium, remote unreachable, internal panic) hands
//! over to the next one; a failure that describes the document itself ends
//! the run. Tiers are never revisited. Once the plan is used up, anything
//! short of a content verdict is reported as `ALL_METHODS_FAILED`.

use crate::config::{ExtractionConfig, TierKind};
use crate::diagnostic::{method, AttemptEntry, DiagnosticRecord};
use crate::engine::PdfEngine;
use crate::error::{ErrorKind, ExtractionError, RunError};
use crate::output::{ExtractedItem, ExtractionResult};
use crate::pipeline::load::{self, LoadStrategy};
use crate::pipeline::remote::{self, RemoteOutcome};
use crate::pipeline::{acquire, fingerprint, repair, RunContext};
use crate::progress::Stage;
use serde_json::json;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Extract images from an in-memory PDF.
///
/// Progress goes to `config.progress_callback`. On success the result
/// carries the diagnostic record; on failure the error does, with
/// recommendations filled in.
///
/// # Example
/// ```rust,no_run
/// use pdfsalvage::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.pdf")?;
/// let result = extract(bytes, "scan.pdf", &ExtractionConfig::default()).await?;
/// for item in &result.items {
///     println!("{} ({}x{})", item.filename, item.width, item.height);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    bytes: impl Into<Arc<[u8]>>,
    filename: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let original: Arc<[u8]> = bytes.into();
    let record = DiagnosticRecord::new(filename, original.len() as u64);
    let mut run = RunContext::new(record, config);
    info!(
        session = %run.record.session_id,
        "Starting extraction of '{}' ({} bytes)",
        filename,
        original.len()
    );
    run.progress.report(Stage::VALIDATION.start, "Validating file");

    let working = match precheck(&original, filename, &mut run) {
        Ok(working) => working,
        Err(err) => return Err(fail(run, err)),
    };
    run.progress.report(Stage::VALIDATION.end, "File validated");

    let engine = config.resolve_engine();
    let mut last_error: Option<RunError> = None;

    let tiers = config.tiers.len();
    for (position, tier) in config.tiers.iter().copied().enumerate() {
        if let Err(err) = run.check_cancelled() {
            return Err(fail(run, err));
        }
        if position > 0 {
            run.progress.enter_window(Stage::FALLBACK);
        }

        let reason = match &last_error {
            None => "first tier".to_string(),
            Some(err) => format!("previous tier failed: {err}"),
        };

        let result = match tier {
            TierKind::Local | TierKind::DegradedLocal => {
                record_tier_entry(&mut run, tier, &reason);
                let (next, result) = run_local_tier(tier, &engine, &working, run).await;
                run = next;
                result
            }
            TierKind::Remote => match config.remote_endpoint.clone() {
                Some(endpoint) => {
                    record_tier_entry(&mut run, tier, &reason);
                    run_remote_tier(&endpoint, &original, &mut run).await
                }
                None => {
                    run.record.record(
                        AttemptEntry::failed(
                            tier.method(),
                            Duration::ZERO,
                            "skipped: no remote endpoint configured",
                        )
                        .with_details(json!({ "reason": reason, "skipped": true })),
                    );
                    info!("Remote tier skipped: no endpoint configured");
                    continue;
                }
            },
        };

        match result {
            Ok(items) => return Ok(finish_success(run, items, tier)),
            Err(err) if position > 0 && position + 1 == tiers => {
                return Err(fail(run, exhausted(tiers, err)));
            }
            Err(err) if !err.is_environmental() => return Err(fail(run, err)),
            Err(err) => {
                warn!("{tier} tier failed ({err}); moving to the next tier");
                last_error = Some(err);
            }
        }
    }

    let terminal = match last_error {
        Some(err) => exhausted(tiers, err),
        None => RunError::Exhausted {
            tiers,
            last: "no tier could run".into(),
            stack: None,
        },
    };
    Err(fail(run, terminal))
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    bytes: impl Into<Arc<[u8]>>,
    filename: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let bytes: Arc<[u8]> = bytes.into();
    match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(extract(bytes, filename, config)),
        Err(e) => Err(ExtractionError::from_run(
            &RunError::Internal {
                message: format!("Failed to create tokio runtime: {e}"),
                stack: None,
            },
            DiagnosticRecord::new(filename, bytes.len() as u64),
        )),
    }
}

/// Read `path` and run [`extract`] on its contents.
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match tokio::fs::read(path).await {
        Ok(bytes) => extract(bytes, &filename, config).await,
        Err(e) => Err(ExtractionError::from_run(
            &RunError::Internal {
                message: format!("cannot read '{}': {e}", path.display()),
                stack: None,
            },
            DiagnosticRecord::new(filename, 0),
        )),
    }
}

// ── Stages ───────────────────────────────────────────────────────────────

/// Size, extension, fingerprint and repair. Returns the buffer to parse.
fn precheck(
    original: &Arc<[u8]>,
    filename: &str,
    run: &mut RunContext,
) -> Result<Arc<[u8]>, RunError> {
    let size = original.len() as u64;
    if size > run.config.max_file_size {
        return Err(RunError::FileTooLarge {
            size,
            limit: run.config.max_file_size,
        });
    }
    if run.config.require_pdf_extension && !has_pdf_extension(filename) {
        return Err(RunError::NotPdf {
            filename: filename.to_string(),
        });
    }
    run.check_cancelled()?;

    let fp = fingerprint::validate(original, &mut run.record);
    if !fp.needs_repair() {
        return Ok(Arc::clone(original));
    }
    match repair::auto_repair(original, &mut run.record) {
        Some(outcome) => {
            info!("Auto-repair applied: {}", outcome.methods.join(", "));
            Ok(Arc::from(outcome.bytes))
        }
        None => Err(RunError::InvalidPdf { header: fp.header }),
    }
}

fn has_pdf_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Failure of the last tier in the plan. Content verdicts and cancellation
/// stand; everything else means the plan is exhausted.
fn exhausted(tiers: usize, err: RunError) -> RunError {
    if err.kind().is_content_related() || matches!(err, RunError::Cancelled) {
        return err;
    }
    RunError::Exhausted {
        tiers,
        last: err.to_string(),
        stack: err.stack().map(str::to_string),
    }
}

fn record_tier_entry(run: &mut RunContext, tier: TierKind, reason: &str) {
    info!("Entering {tier} tier ({reason})");
    run.record.record(
        AttemptEntry::succeeded(tier.method(), Duration::ZERO)
            .with_details(json!({ "reason": reason })),
    );
}

/// Load chain + acquisition on the blocking pool. The context goes in and
/// comes back out so the record survives panics and task failures.
async fn run_local_tier(
    tier: TierKind,
    engine: &Arc<dyn PdfEngine>,
    bytes: &Arc<[u8]>,
    run: RunContext,
) -> (RunContext, Result<Vec<ExtractedItem>, RunError>) {
    let strategies = match tier {
        TierKind::DegradedLocal => LoadStrategy::degraded_chain(),
        _ => LoadStrategy::canonical_chain(),
    };
    let engine = Arc::clone(engine);
    let bytes = Arc::clone(bytes);
    let snapshot = run.clone();

    let task = tokio::task::spawn_blocking(move || {
        let mut run = run;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            load::run_chain(&engine, &bytes, &strategies, &mut run, acquire::acquire_images)
        }));
        let result = outcome.unwrap_or_else(|payload| {
            let text = panic_text(payload.as_ref());
            warn!("Panic in {tier} tier: {text}");
            Err(RunError::Internal {
                message: format!("panic during {tier} tier"),
                stack: Some(text),
            })
        });
        (run, result)
    });

    match task.await {
        Ok(pair) => pair,
        Err(e) => (
            snapshot,
            Err(RunError::Internal {
                message: format!("{tier} tier task failed: {e}"),
                stack: None,
            }),
        ),
    }
}

async fn run_remote_tier(
    endpoint: &str,
    original: &Arc<[u8]>,
    run: &mut RunContext,
) -> Result<Vec<ExtractedItem>, RunError> {
    run.progress.report(0.0, "Contacting remote extraction service");
    let started = Instant::now();
    let session_id = run.record.session_id.clone();
    let filename = run.record.file_name.clone();
    let outcome = remote::extract_remote(
        endpoint,
        original,
        &filename,
        &session_id,
        run.config.remote_timeout(),
        &mut run.namer,
    )
    .await;

    match outcome {
        RemoteOutcome::Extracted {
            items,
            page_count,
            diagnostic,
        } => {
            run.record.record(
                AttemptEntry::succeeded(method::REMOTE_EXTRACTION, started.elapsed())
                    .with_details(json!({
                        "imageCount": items.len(),
                        "remoteDiagnostic": diagnostic,
                    })),
            );
            if run.record.page_count.is_none() {
                run.record.page_count =
                    page_count.or_else(|| items.iter().map(|i| i.page_number).max());
            }
            run.progress.report(100.0, "Remote extraction complete");
            Ok(items)
        }
        RemoteOutcome::Rejected {
            kind,
            message,
            diagnostic,
        } => {
            run.record.record(
                AttemptEntry::failed(method::REMOTE_EXTRACTION, started.elapsed(), &message)
                    .with_details(json!({
                        "errorCode": kind,
                        "remoteDiagnostic": diagnostic,
                    })),
            );
            Err(RunError::RemoteRejected { kind, message })
        }
        RemoteOutcome::Unavailable { reason } => {
            run.record.record(AttemptEntry::failed(
                method::REMOTE_EXTRACTION,
                started.elapsed(),
                &reason,
            ));
            Err(RunError::RemoteUnavailable { reason })
        }
    }
}

fn finish_success(
    mut run: RunContext,
    items: Vec<ExtractedItem>,
    tier: TierKind,
) -> ExtractionResult {
    run.progress.leave_window();
    run.progress.report(Stage::FINALIZE.start, "Finalizing");
    run.record.finalize_success(items.len());
    let page_count = run.record.page_count.unwrap_or(0);
    run.progress
        .report(Stage::FINALIZE.end, format!("Extracted {} image(s)", items.len()));
    info!(
        "Extracted {} image(s) from {} page(s) via {tier} tier in {}ms",
        items.len(),
        page_count,
        run.record.total_duration_ms.unwrap_or(0)
    );
    ExtractionResult {
        items,
        page_count,
        filename: run.record.file_name.clone(),
        tier,
        diagnostic: run.record,
    }
}

fn fail(run: RunContext, err: RunError) -> ExtractionError {
    let kind = err.kind();
    if kind == ErrorKind::Cancelled {
        info!("Extraction cancelled");
    } else {
        warn!("Extraction failed with {kind}: {err}");
    }
    ExtractionError::from_run(&err, run.record)
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
