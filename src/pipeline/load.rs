//! Load-strategy chain: try each (strictness, execution) pair in order until
//! the engine opens the document.
//!
//! The chain is a plain slice of [`LoadStrategy`] values passed in per run;
//! there is no process-wide parser state to flip between attempts.

use super::RunContext;
use crate::diagnostic::{method, AttemptEntry};
use crate::engine::{self, worker, EngineError, LoadedDocument, PdfEngine, Strictness};
use crate::error::RunError;
use crate::progress::Stage;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the engine runs for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Dedicated background thread owning the document.
    Worker,
    /// Calling thread.
    Inline,
}

/// One configuration of the load chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadStrategy {
    pub strictness: Strictness,
    pub execution: ExecutionMode,
}

impl LoadStrategy {
    pub const fn new(strictness: Strictness, execution: ExecutionMode) -> Self {
        Self {
            strictness,
            execution,
        }
    }

    /// Worker configurations first, then inline, each strict → lenient → minimal.
    pub fn canonical_chain() -> Vec<LoadStrategy> {
        [ExecutionMode::Worker, ExecutionMode::Inline]
            .into_iter()
            .flat_map(|execution| {
                [Strictness::Strict, Strictness::Lenient, Strictness::Minimal]
                    .into_iter()
                    .map(move |strictness| LoadStrategy::new(strictness, execution))
            })
            .collect()
    }

    /// The inline half of the canonical chain.
    pub fn degraded_chain() -> Vec<LoadStrategy> {
        Self::canonical_chain()
            .into_iter()
            .filter(|s| s.execution == ExecutionMode::Inline)
            .collect()
    }

    pub fn name(&self) -> String {
        let execution = match self.execution {
            ExecutionMode::Worker => "worker",
            ExecutionMode::Inline => "no_worker",
        };
        format!("{}_{}", self.strictness.as_str(), execution)
    }

    /// Diagnostic tag, e.g. `load_strict_worker`.
    pub fn method(&self) -> String {
        format!("{}{}", method::LOAD_PREFIX, self.name())
    }

    /// Anything other than the preferred strict/worker configuration.
    pub fn is_fallback(&self) -> bool {
        *self != LoadStrategy::new(Strictness::Strict, ExecutionMode::Worker)
    }
}

fn open_with_strategy<T>(
    engine: &Arc<dyn PdfEngine>,
    bytes: &Arc<[u8]>,
    strategy: LoadStrategy,
    startup_timeout: Duration,
    f: impl FnOnce(&mut dyn LoadedDocument) -> T,
) -> Result<T, EngineError> {
    match strategy.execution {
        ExecutionMode::Worker => worker::with_document_in_worker(
            Arc::clone(engine),
            Arc::clone(bytes),
            strategy.strictness,
            startup_timeout,
            f,
        ),
        ExecutionMode::Inline => {
            engine::with_document(engine.as_ref(), bytes, strategy.strictness, f)
        }
    }
}

/// Open `bytes` with the first strategy that works and run `job` against the
/// document.
///
/// Every attempt is recorded as `load_<name>`. An encrypted document stops
/// the chain immediately. Once a strategy has opened the document, whatever
/// `job` returns is the result, unless the worker died under it: that
/// counts as a failed attempt and the chain moves on.
pub fn run_chain<T>(
    engine: &Arc<dyn PdfEngine>,
    bytes: &Arc<[u8]>,
    strategies: &[LoadStrategy],
    run: &mut RunContext,
    mut job: impl FnMut(&mut dyn LoadedDocument, &mut RunContext) -> Result<T, RunError>,
) -> Result<T, RunError> {
    let startup_timeout = run.config.worker_startup_timeout();
    let mut last_error = None;
    let mut environmental = false;

    for (position, strategy) in strategies.iter().copied().enumerate() {
        run.check_cancelled()?;
        run.progress.report(
            Stage::LOAD.at(position, strategies.len()),
            format!("Loading PDF ({})", strategy.name()),
        );

        let tag = strategy.method();
        let started = Instant::now();
        let namer = run.namer.clone();
        debug!("Trying load strategy {}", strategy.name());

        let outcome = open_with_strategy(engine, bytes, strategy, startup_timeout, |doc| {
            if doc.is_encrypted() {
                return Err(RunError::Encrypted { method: tag.clone() });
            }
            let page_count = doc.page_count();
            run.record.record(
                AttemptEntry::succeeded(tag.as_str(), started.elapsed()).with_details(json!({
                    "engine": engine.name(),
                    "pageCount": page_count,
                })),
            );
            run.record.page_count = Some(page_count);
            if run.record.pdf_version.is_none() {
                run.record.pdf_version = doc.version();
            }
            if strategy.is_fallback() {
                run.record.auto_repair_used = Some(strategy.name());
            }
            info!("PDF loaded with {}: {} pages", strategy.name(), page_count);
            job(doc, run)
        });

        match outcome {
            Ok(Err(RunError::Encrypted { method })) => {
                run.record.record(AttemptEntry::failed(
                    method.as_str(),
                    started.elapsed(),
                    EngineError::Encrypted.to_string(),
                ));
                return Err(RunError::Encrypted { method });
            }
            Ok(Err(RunError::LoadFailed {
                last,
                environmental: true,
                ..
            })) if strategy.execution == ExecutionMode::Worker => {
                warn!("Worker failed after opening with {}: {}", strategy.name(), last);
                run.record.record(
                    AttemptEntry::failed(tag.as_str(), started.elapsed(), last.to_string())
                        .with_details(json!({ "environmental": true, "afterOpen": true })),
                );
                run.namer = namer;
                environmental = true;
                last_error = Some(last);
            }
            Ok(result) => return result,
            Err(EngineError::Encrypted) => {
                run.record.record(AttemptEntry::failed(
                    tag.as_str(),
                    started.elapsed(),
                    EngineError::Encrypted.to_string(),
                ));
                info!("Document is encrypted; stopping load chain");
                return Err(RunError::Encrypted { method: tag });
            }
            Err(err) => {
                warn!("Load strategy {} failed: {}", strategy.name(), err);
                run.record.record(
                    AttemptEntry::failed(tag.as_str(), started.elapsed(), err.to_string())
                        .with_details(json!({ "environmental": err.is_environmental() })),
                );
                environmental |= err.is_environmental();
                last_error = Some(err);
            }
        }
    }

    Err(RunError::LoadFailed {
        attempts: strategies.len(),
        last: last_error
            .unwrap_or_else(|| EngineError::ParseFailed("no load strategies configured".into())),
        environmental,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::diagnostic::DiagnosticRecord;
    use crate::engine::fake::{FakeEngine, FakePage};
    use crate::progress::CancelFlag;
    use std::sync::atomic::Ordering;

    fn context(config: ExtractionConfig) -> RunContext {
        RunContext::new(DiagnosticRecord::new("a.pdf", 10), &config)
    }

    fn pdf() -> Arc<[u8]> {
        Arc::from(&b"%PDF-1.7\n%%EOF\n"[..])
    }

    fn chain<T>(
        engine: &Arc<dyn PdfEngine>,
        bytes: &Arc<[u8]>,
        run: &mut RunContext,
        job: impl FnMut(&mut dyn LoadedDocument, &mut RunContext) -> Result<T, RunError>,
    ) -> Result<T, RunError> {
        run_chain(engine, bytes, &LoadStrategy::canonical_chain(), run, job)
    }

    fn load_methods(run: &RunContext) -> Vec<String> {
        run.record.load_attempts().map(|a| a.method.clone()).collect()
    }

    #[test]
    fn canonical_order() {
        let names: Vec<String> = LoadStrategy::canonical_chain()
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "strict_worker",
                "lenient_worker",
                "minimal_worker",
                "strict_no_worker",
                "lenient_no_worker",
                "minimal_no_worker"
            ]
        );
        let degraded: Vec<String> = LoadStrategy::degraded_chain()
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(
            degraded,
            vec!["strict_no_worker", "lenient_no_worker", "minimal_no_worker"]
        );
    }

    #[test]
    fn first_strategy_wins_without_marking_fallback() {
        let engine: Arc<dyn PdfEngine> = Arc::new(FakeEngine::with_pages(vec![FakePage::photo()]));
        let mut run = context(ExtractionConfig::default());
        let pages = chain(&engine, &pdf(), &mut run, |doc, _| Ok(doc.page_count())).unwrap();
        assert_eq!(pages, 1);
        assert_eq!(load_methods(&run), vec!["load_strict_worker"]);
        assert_eq!(run.record.auto_repair_used, None);
        assert_eq!(run.record.page_count, Some(1));
    }

    #[test]
    fn worker_failures_fall_through_to_inline() {
        let engine: Arc<dyn PdfEngine> = Arc::new(FakeEngine {
            worker_unavailable: true,
            ..FakeEngine::with_pages(vec![FakePage::photo()])
        });
        let mut run = context(ExtractionConfig::default());
        chain(&engine, &pdf(), &mut run, |_, _| Ok(())).unwrap();

        assert_eq!(
            load_methods(&run),
            vec![
                "load_strict_worker",
                "load_lenient_worker",
                "load_minimal_worker",
                "load_strict_no_worker"
            ]
        );
        assert_eq!(run.record.auto_repair_used.as_deref(), Some("strict_no_worker"));
    }

    #[test]
    fn worker_crash_after_open_falls_through_to_inline() {
        let fake = Arc::new(FakeEngine {
            crash_in_worker: true,
            ..FakeEngine::with_pages(vec![FakePage::photo()])
        });
        let engine: Arc<dyn PdfEngine> = fake.clone();
        let mut run = context(ExtractionConfig::default());
        let items = chain(&engine, &pdf(), &mut run, crate::pipeline::acquire::acquire_images)
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, format!("{}-0001", &run.record.session_id[..8]));
        let attempts: Vec<(String, bool)> = run
            .record
            .load_attempts()
            .map(|a| (a.method.clone(), a.success))
            .collect();
        assert_eq!(
            attempts,
            vec![
                ("load_strict_worker".to_string(), true),
                ("load_strict_worker".to_string(), false),
                ("load_lenient_worker".to_string(), true),
                ("load_lenient_worker".to_string(), false),
                ("load_minimal_worker".to_string(), true),
                ("load_minimal_worker".to_string(), false),
                ("load_strict_no_worker".to_string(), true),
            ]
        );
        assert_eq!(run.record.auto_repair_used.as_deref(), Some("strict_no_worker"));
        assert_eq!(
            fake.opened.load(Ordering::SeqCst),
            fake.released.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn encryption_short_circuits() {
        let fake = Arc::new(FakeEngine {
            encrypted: true,
            ..FakeEngine::with_pages(vec![FakePage::photo()])
        });
        let engine: Arc<dyn PdfEngine> = fake.clone();
        let mut run = context(ExtractionConfig::default());
        let err = chain(&engine, &pdf(), &mut run, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, RunError::Encrypted { .. }));
        assert_eq!(load_methods(&run), vec!["load_strict_worker"]);
        assert_eq!(fake.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parse_failures_exhaust_as_content_error() {
        let engine: Arc<dyn PdfEngine> = Arc::new(FakeEngine::with_pages(vec![FakePage::photo()]));
        let mut run = context(ExtractionConfig::default());
        let garbage: Arc<[u8]> = Arc::from(&b"not a pdf"[..]);
        let err = chain(&engine, &garbage, &mut run, |_, _| Ok(())).unwrap_err();
        match err {
            RunError::LoadFailed {
                attempts,
                environmental,
                ..
            } => {
                assert_eq!(attempts, 6);
                assert!(!environmental);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(run.record.load_attempts().count(), 6);
    }

    #[test]
    fn job_errors_stop_the_chain() {
        let engine: Arc<dyn PdfEngine> = Arc::new(FakeEngine::with_pages(vec![FakePage::text()]));
        let mut run = context(ExtractionConfig::default());
        let err = chain::<()>(&engine, &pdf(), &mut run, |_, _| {
            Err(RunError::NoImages { pages: 1 })
        })
        .unwrap_err();
        assert!(matches!(err, RunError::NoImages { .. }));
        assert_eq!(run.record.load_attempts().count(), 1);
    }

    #[test]
    fn cancellation_before_first_attempt() {
        let flag = CancelFlag::new();
        flag.cancel();
        let config = ExtractionConfig::builder().cancel_flag(flag).build().unwrap();
        let engine: Arc<dyn PdfEngine> = Arc::new(FakeEngine::with_pages(vec![FakePage::photo()]));
        let mut run = context(config);
        let err = chain(&engine, &pdf(), &mut run, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(run.record.load_attempts().count(), 0);
    }
}
