use crate::detection::domain::person_detector::DetectorBackend;
use crate::shared::constants::{TRACKER_MAX_LOST, YOLO_MODEL_NAME};

use super::bytetrack_tracker::{ByteTracker, TrackerConfig};
use super::model_resolver::{self, ModelSource, ProgressFn};
use super::onnx_yolo_detector::{DetectorThresholds, OnnxYoloPersonDetector};

/// Everything needed to build the person detector.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub model: ModelSource,
    pub thresholds: DetectorThresholds,
    /// Attach ByteTrack for persistent identities. When false, every
    /// detection becomes its own group.
    pub tracking: bool,
}

/// Creates the best available detector backend.
///
/// A model that cannot be resolved or loaded is not fatal: the backend is
/// reported as unavailable and ingest degrades to producing empty sessions.
pub fn build_backend(config: &DetectorConfig, progress: Option<ProgressFn>) -> DetectorBackend {
    let model_path = match model_resolver::resolve(YOLO_MODEL_NAME, &config.model, progress) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("Person detection disabled: {e}");
            return DetectorBackend::unavailable(e.to_string());
        }
    };

    let tracker = config
        .tracking
        .then(|| ByteTracker::new(TrackerConfig::with_max_lost(TRACKER_MAX_LOST)));

    match OnnxYoloPersonDetector::new(&model_path, tracker, config.thresholds) {
        Ok(detector) => DetectorBackend::Available(Box::new(detector)),
        Err(e) => {
            log::warn!(
                "Person detection disabled: failed to load {}: {e}",
                model_path.display()
            );
            DetectorBackend::unavailable(format!("failed to load model: {e}"))
        }
    }
}
