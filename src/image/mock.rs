use super::{fit_within, PreviewBounds, PreviewService};
use crate::models::{PreviewAsset, SourceImage};
use crate::Result;
use std::sync::{Arc, Mutex};

/// Preview generator that never decodes, for driving the orchestrator
/// with arbitrary payloads.
#[derive(Clone)]
pub struct MockImageNormalizer {
    normalize_count: Arc<Mutex<usize>>,
    dimensions: (u32, u32),
    should_fail: Arc<Mutex<bool>>,
}

impl MockImageNormalizer {
    pub fn new() -> Self {
        Self {
            normalize_count: Arc::new(Mutex::new(0)),
            dimensions: (1600, 1200),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Pretend every source decodes to these dimensions.
    pub fn with_source_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = (width, height);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_normalize_count(&self) -> usize {
        *self.normalize_count.lock().unwrap()
    }
}

impl Default for MockImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewService for MockImageNormalizer {
    fn normalize(&self, source: &SourceImage, bounds: PreviewBounds) -> Result<PreviewAsset> {
        *self.normalize_count.lock().unwrap() += 1;

        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::Decode(image::ImageError::IoError(
                std::io::Error::other("Mock failure"),
            )));
        }

        let (exact_width, exact_height) = fit_within(self.dimensions.0, self.dimensions.1, bounds);

        Ok(PreviewAsset {
            bytes: format!("preview:{}", source.filename()).into_bytes(),
            width: exact_width.round() as u32,
            height: exact_height.round() as u32,
            exact_width,
            exact_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceImage {
        SourceImage::new(b"fake image data".to_vec(), "image/png", "test.png")
    }

    #[test]
    fn test_mock_normalizer() {
        let normalizer = MockImageNormalizer::new();

        let preview = normalizer
            .normalize(&source(), PreviewBounds::default())
            .unwrap();

        assert_eq!((preview.width, preview.height), (800, 600));
        assert_eq!(preview.bytes, b"preview:test.png");
        assert_eq!(normalizer.get_normalize_count(), 1);
    }

    #[test]
    fn test_mock_with_custom_dimensions() {
        let normalizer = MockImageNormalizer::new().with_source_dimensions(300, 200);

        let preview = normalizer
            .normalize(&source(), PreviewBounds::default())
            .unwrap();

        assert_eq!((preview.width, preview.height), (300, 200));
    }

    #[test]
    fn test_mock_with_failure() {
        let normalizer = MockImageNormalizer::new().with_failure(true);

        let result = normalizer.normalize(&source(), PreviewBounds::default());
        assert!(result.is_err());
        assert_eq!(normalizer.get_normalize_count(), 1);
    }
}
