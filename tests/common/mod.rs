//! Shared helpers for integration tests: a scripted in-memory engine and a
//! few canned documents.

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use pdfsalvage::engine::{EngineError, LoadedDocument, PageSize, PdfEngine, Strictness};
use pdfsalvage::{ExtractionConfig, ExtractionConfigBuilder, TierKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Scripted engine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScriptedPage {
    pub size: PageSize,
    pub image_ops: usize,
    pub fail_render: bool,
    pub panic_render: bool,
}

impl ScriptedPage {
    /// Small page painting one image.
    pub fn photo() -> Self {
        Self {
            size: PageSize::new(40.0, 60.0),
            image_ops: 1,
            fail_render: false,
            panic_render: false,
        }
    }

    /// Small page with no image operations.
    pub fn text() -> Self {
        Self {
            image_ops: 0,
            ..Self::photo()
        }
    }
}

/// Deterministic [`PdfEngine`] whose behaviour is set per test.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    pub pages: Vec<ScriptedPage>,
    /// Every open reports a password error.
    pub encrypted: bool,
    /// Background workers cannot be prepared.
    pub worker_unavailable: bool,
    /// Rendering panics on the `pdf-worker` thread and works inline.
    pub crash_in_worker: bool,
    /// The next N opens fail as if the native library were missing.
    pub unavailable_opens: AtomicUsize,
    /// Every open that gets past the environment checks fails to parse.
    pub unparseable: bool,
    /// Strict opens require a `%%EOF` trailer.
    pub strict_needs_trailer: bool,
    pub open_calls: AtomicUsize,
    pub opened: AtomicUsize,
    pub released: AtomicUsize,
}

impl ScriptedEngine {
    pub fn with_pages(pages: Vec<ScriptedPage>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn photos(n: usize) -> Self {
        Self::with_pages(vec![ScriptedPage::photo(); n])
    }

    pub fn texts(n: usize) -> Self {
        Self::with_pages(vec![ScriptedPage::text(); n])
    }

    pub fn failing_first_opens(mut self, n: usize) -> Self {
        self.unavailable_opens = AtomicUsize::new(n);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    fn take_unavailable(&self) -> bool {
        self.unavailable_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

struct ScriptedDocument<'a> {
    engine: &'a ScriptedEngine,
}

impl Drop for ScriptedDocument<'_> {
    fn drop(&mut self) {
        self.engine.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedDocument<'_> {
    fn page(&self, index: usize) -> Result<&ScriptedPage, EngineError> {
        self.engine.pages.get(index).ok_or(EngineError::PageFailed {
            page: index + 1,
            detail: "no such page".into(),
        })
    }
}

impl LoadedDocument for ScriptedDocument<'_> {
    fn page_count(&self) -> usize {
        self.engine.pages.len()
    }

    fn version(&self) -> Option<String> {
        Some("1.7".into())
    }

    fn page_size(&mut self, index: usize) -> Result<PageSize, EngineError> {
        Ok(self.page(index)?.size)
    }

    fn image_operator_count(&mut self, index: usize) -> Result<usize, EngineError> {
        Ok(self.page(index)?.image_ops)
    }

    fn render_page(&mut self, index: usize, scale: f32) -> Result<DynamicImage, EngineError> {
        let page = self.page(index)?;
        if self.engine.crash_in_worker && std::thread::current().name() == Some("pdf-worker") {
            panic!("renderer crashed in worker on page {}", index + 1);
        }
        if page.panic_render {
            panic!("renderer crashed on page {}", index + 1);
        }
        if page.fail_render {
            return Err(EngineError::PageFailed {
                page: index + 1,
                detail: "render failed".into(),
            });
        }
        let (w, h) = page.size.pixels_at(scale);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            w,
            h,
            Rgb([30, 120, 200]),
        )))
    }
}

impl PdfEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn prepare_worker(&self) -> Result<(), EngineError> {
        if self.worker_unavailable {
            Err(EngineError::WorkerUnavailable(
                "worker script could not be loaded".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn open(
        &self,
        bytes: &[u8],
        strictness: Strictness,
        scope: &mut dyn FnMut(&mut dyn LoadedDocument),
    ) -> Result<(), EngineError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_unavailable() {
            return Err(EngineError::EngineUnavailable("libpdfium not found".into()));
        }
        if !bytes.starts_with(b"%PDF-") {
            return Err(EngineError::ParseFailed("no header".into()));
        }
        if self.encrypted {
            return Err(EngineError::Encrypted);
        }
        if self.unparseable {
            return Err(EngineError::ParseFailed("cross-reference table is corrupt".into()));
        }
        if strictness == Strictness::Strict && self.strict_needs_trailer {
            let tail = &bytes[bytes.len().saturating_sub(1024)..];
            if !tail.windows(5).any(|w| w == b"%%EOF") {
                return Err(EngineError::ParseFailed("trailer not found".into()));
            }
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut doc = ScriptedDocument { engine: self };
        scope(&mut doc);
        Ok(())
    }
}

// ── Documents and configs ────────────────────────────────────────────────────

/// A buffer that passes fingerprinting without repair.
pub fn valid_pdf() -> Vec<u8> {
    b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n"
        .to_vec()
}

/// `valid_pdf` padded with spaces before the trailer to exactly `len` bytes.
pub fn valid_pdf_of_len(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    let tail = b"\n%%EOF\n";
    assert!(len >= bytes.len() + tail.len());
    bytes.resize(len - tail.len(), b' ');
    bytes.extend_from_slice(tail);
    assert_eq!(bytes.len(), len);
    bytes
}

pub fn builder_for(engine: &Arc<ScriptedEngine>) -> ExtractionConfigBuilder {
    let engine: Arc<dyn PdfEngine> = engine.clone();
    ExtractionConfig::builder()
        .engine(engine)
        .worker_startup_timeout_secs(10)
}

pub fn config_for(engine: &Arc<ScriptedEngine>) -> ExtractionConfig {
    builder_for(engine).build().unwrap()
}

pub fn local_only(engine: &Arc<ScriptedEngine>) -> ExtractionConfig {
    builder_for(engine)
        .tiers(vec![TierKind::Local])
        .build()
        .unwrap()
}

/// URL of a port nothing listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/extract")
}
