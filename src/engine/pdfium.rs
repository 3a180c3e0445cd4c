//! [`PdfEngine`] backed by pdfium via `pdfium-render`.
//!
//! A fresh `Pdfium` binding is created for every `open` call, on whichever
//! thread makes the call. Instances are never shared, so a document and the
//! binding it borrows live and die together inside [`PdfiumEngine::open`].
//!
//! Library lookup order: explicit path from the config, `PDFIUM_LIB_PATH`,
//! the current directory, then the system library path.

use super::{EngineError, LoadedDocument, PageSize, PdfEngine, Strictness};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, warn};

/// pdfium-backed engine.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the pdfium shared library at `path` instead of searching.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, EngineError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(&path).map_err(|e| {
                EngineError::EngineUnavailable(format!(
                    "cannot bind pdfium at '{}': {e}",
                    path.display()
                ))
            })?,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| {
                    EngineError::EngineUnavailable(format!(
                        "no pdfium library found (set PDFIUM_LIB_PATH): {e}"
                    ))
                })?,
        };

        Ok(Pdfium::new(bindings))
    }
}

fn map_load_error(err: PdfiumError) -> EngineError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            EngineError::Encrypted
        }
        other => EngineError::from_message(format!("{other:?}")),
    }
}

/// `PdfDocumentVersion` debug names look like `Pdf1_7`.
fn version_token(version: PdfDocumentVersion) -> Option<String> {
    let raw = format!("{version:?}");
    let digits = raw.strip_prefix("Pdf")?;
    let token = digits.replace('_', ".");
    if token.chars().all(|c| c.is_ascii_digit() || c == '.') {
        Some(token)
    } else {
        None
    }
}

impl PdfEngine for PdfiumEngine {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn open(
        &self,
        bytes: &[u8],
        strictness: Strictness,
        scope: &mut dyn FnMut(&mut dyn LoadedDocument),
    ) -> Result<(), EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(map_load_error)?;

        let mut doc = PdfiumDocument::new(document, strictness)?;
        debug!(
            "pdfium opened document: {} pages ({})",
            doc.page_count,
            strictness.as_str()
        );
        scope(&mut doc);
        Ok(())
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
    page_count: usize,
    version: Option<String>,
    full_features: bool,
}

impl<'a> PdfiumDocument<'a> {
    fn new(document: PdfDocument<'a>, strictness: Strictness) -> Result<Self, EngineError> {
        let page_count = document.pages().len() as usize;
        let version = version_token(document.version());

        if strictness == Strictness::Strict {
            if page_count == 0 {
                return Err(EngineError::ParseFailed("document has no pages".into()));
            }
            for index in 0..page_count {
                document.pages().get(index as u16).map_err(|e| {
                    EngineError::ParseFailed(format!("page {} unreadable: {e:?}", index + 1))
                })?;
            }
        }

        Ok(Self {
            document,
            page_count,
            version,
            full_features: strictness.renders_full_features(),
        })
    }

    fn page(&self, index: usize) -> Result<PdfPage<'a>, EngineError> {
        if index >= self.page_count {
            return Err(EngineError::PageFailed {
                page: index + 1,
                detail: format!("out of range (document has {} pages)", self.page_count),
            });
        }
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| EngineError::PageFailed {
                page: index + 1,
                detail: format!("{e:?}"),
            })
    }
}

impl LoadedDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn page_size(&mut self, index: usize) -> Result<PageSize, EngineError> {
        let page = self.page(index)?;
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    fn image_operator_count(&mut self, index: usize) -> Result<usize, EngineError> {
        let page = self.page(index)?;
        let count = page
            .objects()
            .iter()
            .filter(|object| object.object_type() == PdfPageObjectType::Image)
            .count();
        Ok(count)
    }

    fn render_page(&mut self, index: usize, scale: f32) -> Result<DynamicImage, EngineError> {
        let page = self.page(index)?;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .render_form_data(self.full_features)
            .render_annotations(self.full_features);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| EngineError::PageFailed {
                page: index + 1,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        if image.width() == 0 || image.height() == 0 {
            warn!("pdfium produced an empty bitmap for page {}", index + 1);
        }
        Ok(image)
    }
}
