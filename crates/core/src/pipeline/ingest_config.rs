use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::DEFAULT_MIN_BOX_AREA;

/// Pipeline-side tuning. Detector thresholds live with the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Boxes smaller than this many pixels after clamping are dropped.
    pub min_box_area: u64,
    /// Without tracking, run detection on every Nth frame only.
    pub sample_every: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_box_area: DEFAULT_MIN_BOX_AREA,
            sample_every: 1,
        }
    }
}
