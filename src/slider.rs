//! Before/after comparison slider
//!
//! The original image is drawn on top of the processed one and clipped to
//! the band right of the divider, so dragging left reveals more of the
//! original and dragging right reveals more of the result.

use serde::Serialize;

pub const SLIDER_MIN: u8 = 0;
pub const SLIDER_MAX: u8 = 100;
pub const SLIDER_DEFAULT: u8 = 50;

/// Horizontal band of the frame, in percent of its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Band {
    pub from: u8,
    pub to: u8,
}

/// Which part of the frame each image occupies for a divider position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClipRegion {
    pub original: Band,
    pub processed: Band,
}

impl ClipRegion {
    /// CSS `clip-path` applied to the original image.
    pub fn css_polygon(&self) -> String {
        let p = self.original.from;
        format!("polygon({p}% 0, 100% 0, 100% 100%, {p}% 100%)")
    }
}

pub fn clamp_position(position: i64) -> u8 {
    position.clamp(i64::from(SLIDER_MIN), i64::from(SLIDER_MAX)) as u8
}

pub fn clip_region(position: u8) -> ClipRegion {
    let p = position.min(SLIDER_MAX);
    ClipRegion {
        original: Band {
            from: p,
            to: SLIDER_MAX,
        },
        processed: Band {
            from: SLIDER_MIN,
            to: p,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonSlider {
    position: u8,
}

impl ComparisonSlider {
    pub fn new() -> Self {
        Self {
            position: SLIDER_DEFAULT,
        }
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn set_position(&mut self, position: i64) -> u8 {
        self.position = clamp_position(position);
        self.position
    }

    /// Apply a raw value from a range input. Unparsable input is ignored.
    pub fn set_from_input(&mut self, raw: &str) -> u8 {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return self.set_position(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => self.set_position(value.round() as i64),
            _ => {
                tracing::debug!("Ignoring slider input '{}'", raw);
                self.position
            }
        }
    }

    pub fn clip_region(&self) -> ClipRegion {
        clip_region(self.position)
    }

    /// CSS `left` offset of the divider line.
    pub fn divider_offset(&self) -> String {
        format!("{}%", self.position)
    }
}

impl Default for ComparisonSlider {
    fn default() -> Self {
        Self::new()
    }
}
