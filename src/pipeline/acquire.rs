//! Image acquisition from an opened document.
//!
//! Embedded pass first: every page that paints at least one image is
//! rendered whole at the embedded scale. Only when that pass yields nothing
//! is every page rasterized at the configured DPI. Single-page failures are
//! recorded and skipped; an environment failure (the worker died, the engine
//! went away) aborts the pass instead, since every later page would fail the
//! same way.

use super::encode::{encode_image, RenderPlan};
use super::RunContext;
use crate::diagnostic::{method, AttemptEntry};
use crate::engine::{EngineError, LoadedDocument};
use crate::error::RunError;
use crate::output::{ExtractedItem, ItemSource};
use crate::progress::Stage;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run both passes against `doc`.
pub fn acquire_images(
    doc: &mut dyn LoadedDocument,
    run: &mut RunContext,
) -> Result<Vec<ExtractedItem>, RunError> {
    let page_count = doc.page_count();
    if page_count > run.config.max_pages {
        return Err(RunError::TooManyPages {
            count: page_count,
            limit: run.config.max_pages,
        });
    }

    let items = embedded_pass(doc, run, page_count)?;
    if !items.is_empty() {
        return Ok(items);
    }

    let items = rasterize_pass(doc, run, page_count)?;
    if items.is_empty() {
        return Err(RunError::NoImages { pages: page_count });
    }
    Ok(items)
}

fn embedded_pass(
    doc: &mut dyn LoadedDocument,
    run: &mut RunContext,
    page_count: usize,
) -> Result<Vec<ExtractedItem>, RunError> {
    let started = Instant::now();
    let scale = run.config.embedded_scale;
    let mut items = Vec::new();
    let mut image_pages = 0usize;
    let mut downgraded = 0usize;

    for index in 0..page_count {
        run.check_cancelled()?;
        run.progress.report(
            Stage::EMBEDDED_SCAN.at(index, page_count),
            format!("Scanning page {}/{} for images", index + 1, page_count),
        );

        let ops = match doc.image_operator_count(index) {
            Ok(n) => n,
            Err(err) => {
                skip_page(run, index, "embedded", err, Instant::now())?;
                continue;
            }
        };
        if ops == 0 {
            continue;
        }
        image_pages += 1;
        debug!("Page {} paints {} image(s)", index + 1, ops);

        let page_started = Instant::now();
        match render_item(doc, run, index, scale, ItemSource::Embedded) {
            Ok((item, was_downgraded)) => {
                downgraded += usize::from(was_downgraded);
                items.push(item);
            }
            Err(err) => skip_page(run, index, "embedded", err, page_started)?,
        }
    }
    run.progress
        .report(Stage::EMBEDDED_SCAN.end, "Embedded image scan complete");

    let details = json!({
        "pagesScanned": page_count,
        "pagesWithImages": image_pages,
        "imageCount": items.len(),
        "downgraded": downgraded,
    });
    let entry = if items.is_empty() {
        AttemptEntry::failed(
            method::EMBEDDED_EXTRACTION,
            started.elapsed(),
            "no page produced an embedded image",
        )
    } else {
        AttemptEntry::succeeded(method::EMBEDDED_EXTRACTION, started.elapsed())
    };
    run.record.record(entry.with_details(details));
    info!(
        "Embedded pass: {} image(s) from {} page(s)",
        items.len(),
        page_count
    );
    Ok(items)
}

fn rasterize_pass(
    doc: &mut dyn LoadedDocument,
    run: &mut RunContext,
    page_count: usize,
) -> Result<Vec<ExtractedItem>, RunError> {
    let started = Instant::now();
    let scale = run.config.raster_scale();
    let mut items = Vec::with_capacity(page_count);
    let mut downgraded = 0usize;

    for index in 0..page_count {
        run.check_cancelled()?;
        run.progress.report(
            Stage::RASTERIZE.at(index, page_count),
            format!("Rendering page {}/{}", index + 1, page_count),
        );

        let page_started = Instant::now();
        match render_item(doc, run, index, scale, ItemSource::Rasterized) {
            Ok((item, was_downgraded)) => {
                downgraded += usize::from(was_downgraded);
                items.push(item);
            }
            Err(err) => skip_page(run, index, "rasterize", err, page_started)?,
        }
    }
    run.progress.report(Stage::RASTERIZE.end, "Page rendering complete");

    let details = json!({
        "pagesRendered": items.len(),
        "dpi": run.config.raster_dpi,
        "downgraded": downgraded,
    });
    let entry = if items.is_empty() {
        AttemptEntry::failed(
            method::PAGE_RASTERIZATION,
            started.elapsed(),
            "no page could be rendered",
        )
    } else {
        AttemptEntry::succeeded(method::PAGE_RASTERIZATION, started.elapsed())
    };
    run.record.record(entry.with_details(details));
    info!("Rasterization pass: {} page(s) rendered", items.len());
    Ok(items)
}

/// Render, encode and name one page. The flag reports a memory downgrade.
fn render_item(
    doc: &mut dyn LoadedDocument,
    run: &mut RunContext,
    index: usize,
    scale: f32,
    source: ItemSource,
) -> Result<(ExtractedItem, bool), EngineError> {
    let size = doc.page_size(index)?;
    let plan = RenderPlan::for_page(size, scale, run.config.max_image_bytes);
    let image = doc.render_page(index, plan.scale)?;
    let data = encode_image(&image, plan.format, run.config.lossy_quality).map_err(|e| {
        EngineError::PageFailed {
            page: index + 1,
            detail: format!("encoding failed: {e}"),
        }
    })?;

    let page_number = index + 1;
    let (id, filename) = run.namer.assign(page_number, plan.format, source);
    let item = ExtractedItem {
        id,
        page_number,
        width: image.width(),
        height: image.height(),
        format: plan.format,
        data,
        filename,
        source,
    };
    Ok((item, plan.downgraded))
}

/// Record a page failure. Content failures skip the page; environment
/// failures end the pass.
fn skip_page(
    run: &mut RunContext,
    index: usize,
    pass: &str,
    err: EngineError,
    started: Instant,
) -> Result<(), RunError> {
    let environmental = err.is_environmental();
    run.record.record(
        AttemptEntry::failed(method::PAGE_RENDER, started.elapsed(), err.to_string())
            .with_details(json!({
                "page": index + 1,
                "pass": pass,
                "environmental": environmental,
            })),
    );
    if environmental {
        warn!("Page {} ({pass} pass) hit an environment failure: {err}", index + 1);
        return Err(RunError::from(err));
    }
    warn!("Skipping page {} ({pass} pass): {err}", index + 1);
    Ok(())
}
