//! Preview generation for acquired images
//!
//! Decodes the raw upload and produces a bounded, JPEG re-encoded preview
//! for display. The original bytes are left untouched for the remote call.

pub mod mime;
pub mod mock;
pub mod normalizer;

pub use mime::detect_image_mime;
pub use mock::MockImageNormalizer;
pub use normalizer::{fit_within, ImageNormalizer};

use crate::models::{PreviewAsset, SourceImage};
use crate::Result;

pub const PREVIEW_MAX_WIDTH: u32 = 800;
pub const PREVIEW_MAX_HEIGHT: u32 = 800;
pub const PREVIEW_JPEG_QUALITY: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for PreviewBounds {
    fn default() -> Self {
        Self {
            max_width: PREVIEW_MAX_WIDTH,
            max_height: PREVIEW_MAX_HEIGHT,
        }
    }
}

pub trait PreviewService: Send + Sync {
    fn normalize(&self, source: &SourceImage, bounds: PreviewBounds) -> Result<PreviewAsset>;
}
