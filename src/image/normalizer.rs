use super::{PreviewBounds, PreviewService, PREVIEW_JPEG_QUALITY};
use crate::models::{PreviewAsset, SourceImage};
use crate::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

/// Compute preview dimensions for an image, never upscaling.
///
/// The limiting side lands exactly on its bound and the other side is scaled
/// proportionally. The returned values are not rounded.
pub fn fit_within(width: u32, height: u32, bounds: PreviewBounds) -> (f64, f64) {
    let (w, h) = (f64::from(width), f64::from(height));
    let (max_w, max_h) = (f64::from(bounds.max_width), f64::from(bounds.max_height));

    if w <= max_w && h <= max_h {
        return (w, h);
    }

    let scale_w = max_w / w;
    let scale_h = max_h / h;
    if scale_w <= scale_h {
        (max_w, h * scale_w)
    } else {
        (w * scale_h, max_h)
    }
}

fn to_pixels(exact: f64) -> u32 {
    (exact.round() as u32).max(1)
}

pub struct ImageNormalizer;

impl ImageNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewService for ImageNormalizer {
    fn normalize(&self, source: &SourceImage, bounds: PreviewBounds) -> Result<PreviewAsset> {
        let img = image::load_from_memory(source.bytes())?;

        let (exact_width, exact_height) = fit_within(img.width(), img.height(), bounds);
        let (width, height) = (to_pixels(exact_width), to_pixels(exact_height));

        let resized = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Triangle)
        };

        // JPEG carries no alpha channel
        let rgb = resized.to_rgb8();
        let mut bytes = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(
            &mut bytes,
            PREVIEW_JPEG_QUALITY,
        ))?;

        tracing::debug!(
            "Generated {}x{} preview for {} ({} bytes)",
            width,
            height,
            source.filename(),
            bytes.len()
        );

        Ok(PreviewAsset {
            bytes,
            width,
            height,
            exact_width,
            exact_height,
        })
    }
}
