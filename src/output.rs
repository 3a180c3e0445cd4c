//! Output types returned by a successful extraction.

use crate::config::TierKind;
use crate::diagnostic::DiagnosticRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Encoding of an [`ExtractedItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    /// Accepts `png`, `jpeg`/`jpg` and the corresponding MIME types.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" | "image/png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" | "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub(crate) fn as_image_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Which pass produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    /// Page contained image paint operations.
    Embedded,
    /// Page rendered because no page had image operations.
    Rasterized,
    /// Returned by the remote extraction service.
    Remote,
}

/// One extracted image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    /// Synthetic id, unique within the run.
    pub id: String,
    /// 1-based page the image came from.
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Encoded image bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Suggested filename, e.g. `report_page003.png`.
    pub filename: String,
    pub source: ItemSource,
}

impl ExtractedItem {
    /// `data:<mime>;base64,<payload>`.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.data)
        )
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Items in page order.
    pub items: Vec<ExtractedItem>,
    pub page_count: usize,
    pub filename: String,
    /// Tier that produced the items.
    pub tier: TierKind,
    pub diagnostic: DiagnosticRecord,
}

impl ExtractionResult {
    pub fn total_bytes(&self) -> usize {
        self.items.iter().map(ExtractedItem::byte_len).sum()
    }
}

/// Hands out item ids and filenames for one run.
#[derive(Debug, Clone)]
pub struct ItemNamer {
    stem: String,
    prefix: String,
    next: usize,
    /// Items already named per (page, suffix).
    seen: HashMap<(usize, &'static str), usize>,
}

impl ItemNamer {
    pub fn new(filename: &str, session_id: &str) -> Self {
        let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        let stem = match base.rfind('.') {
            Some(dot) if dot > 0 => &base[..dot],
            _ => base,
        };
        let stem: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let stem = if stem.is_empty() { "document".to_string() } else { stem };
        Self {
            stem,
            prefix: session_id.chars().take(8).collect(),
            next: 0,
            seen: HashMap::new(),
        }
    }

    /// `(id, filename)` for the next item. A page that yields more than one
    /// item gets `_2`, `_3`, ... on the later names.
    pub fn assign(
        &mut self,
        page_number: usize,
        format: ImageFormat,
        source: ItemSource,
    ) -> (String, String) {
        self.next += 1;
        let id = format!("{}-{:04}", self.prefix, self.next);
        let suffix = match source {
            ItemSource::Rasterized => "_render",
            ItemSource::Embedded | ItemSource::Remote => "",
        };
        let count = self.seen.entry((page_number, suffix)).or_insert(0);
        *count += 1;
        let repeat = match *count {
            1 => String::new(),
            n => format!("_{n}"),
        };
        let filename = format!(
            "{}_page{:03}{}{}.{}",
            self.stem,
            page_number,
            suffix,
            repeat,
            format.extension()
        );
        (id, filename)
    }
}
