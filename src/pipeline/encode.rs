//! Image encoding and the per-image memory rule.
//!
//! Renders are PNG by default. When a render at the requested scale would
//! need more than the configured ceiling of decoded RGBA memory, the scale
//! is reduced (keeping the aspect ratio) and the output switches to JPEG.

use crate::engine::PageSize;
use crate::output::ImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

const BYTES_PER_PIXEL: u64 = 4;

/// Scale and encoding chosen for one page render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPlan {
    pub scale: f32,
    pub format: ImageFormat,
    /// `true` when the memory ceiling forced a smaller scale.
    pub downgraded: bool,
}

impl RenderPlan {
    pub fn for_page(size: PageSize, scale: f32, max_bytes: u64) -> Self {
        let estimate = estimated_bytes(size, scale);
        if estimate <= max_bytes {
            return Self {
                scale,
                format: ImageFormat::Png,
                downgraded: false,
            };
        }

        let mut reduced = scale * ((max_bytes as f64 / estimate as f64).sqrt() as f32);
        // Pixel rounding can leave the estimate a hair over the ceiling.
        while reduced > 0.01 && estimated_bytes(size, reduced) > max_bytes {
            reduced *= 0.99;
        }
        debug!(
            "Render of {}x{} pt at {scale:.2}x needs ~{estimate} bytes; reducing scale to {reduced:.3}",
            size.width, size.height
        );
        Self {
            scale: reduced,
            format: ImageFormat::Jpeg,
            downgraded: true,
        }
    }
}

/// Decoded RGBA size of a render of `size` at `scale`.
pub fn estimated_bytes(size: PageSize, scale: f32) -> u64 {
    let (w, h) = size.pixels_at(scale);
    w as u64 * h as u64 * BYTES_PER_PIXEL
}

/// Encode `img` as `format`. `quality` only applies to JPEG.
pub fn encode_image(
    img: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), format.as_image_format())?;
        }
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
        }
    }
    debug!(
        "Encoded {}x{} image → {} bytes {}",
        img.width(),
        img.height(),
        buf.len(),
        format.extension()
    );
    Ok(buf)
}

pub fn data_uri(bytes: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

/// Accepts a `data:` URI or bare base64. Returns the payload and the format
/// named by the URI, if any.
pub fn decode_data_uri(value: &str) -> Option<(Vec<u8>, Option<ImageFormat>)> {
    match value.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest.split_once(',')?;
            let mime = meta.strip_suffix(";base64")?;
            let bytes = STANDARD.decode(payload.trim()).ok()?;
            Some((bytes, ImageFormat::parse(mime)))
        }
        None => STANDARD.decode(value.trim()).ok().map(|bytes| (bytes, None)),
    }
}
