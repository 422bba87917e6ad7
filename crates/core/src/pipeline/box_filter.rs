use crate::pipeline::frame_outcome::SkipReason;
use crate::shared::bounding_box::{BoundingBox, ClampError, PixelRect, DEFAULT_MIN_BOX_AREA};

/// Turns raw detector boxes into crop rectangles, rejecting the ones that
/// would produce unusable crops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxFilter {
    min_area: u64,
}

impl BoxFilter {
    pub fn new(min_area: u64) -> Self {
        Self { min_area }
    }

    /// Clamps `bbox` to a `width` × `height` frame and applies the area floor.
    pub fn accept(&self, bbox: &BoundingBox, width: u32, height: u32) -> Result<PixelRect, SkipReason> {
        let rect = bbox.clamp_to(width, height).map_err(|e| match e {
            ClampError::NonFinite => SkipReason::NonFiniteBox,
            ClampError::Degenerate => SkipReason::DegenerateBox,
        })?;
        if rect.area() < self.min_area {
            return Err(SkipReason::BelowMinArea);
        }
        Ok(rect)
    }
}

impl Default for BoxFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BOX_AREA)
    }
}
