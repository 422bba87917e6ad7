use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cropsort_core::detection::infrastructure::detector_factory::DetectorConfig;
use cropsort_core::detection::infrastructure::model_resolver::ModelSource;
use cropsort_core::detection::infrastructure::onnx_yolo_detector::DetectorThresholds;
use cropsort_core::pipeline::ingest_config::IngestConfig;
use cropsort_core::session::domain::store_layout::StoreLayout;
use cropsort_core::shared::bounding_box::DEFAULT_MIN_BOX_AREA;
use cropsort_core::shared::constants::{DEFAULT_CONFIDENCE, DEFAULT_IOU_THRESHOLD};

/// Persistent defaults, read from `<config dir>/cropsort/settings.json`.
/// Missing fields fall back to their defaults; command-line flags win over
/// anything stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub layout: StoreLayout,
    pub model_path: Option<PathBuf>,
    pub model_url: Option<String>,
    pub confidence: f64,
    pub iou: f64,
    pub min_box_area: u64,
    pub sample_every: usize,
    pub tracking: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layout: StoreLayout::under(&default_data_dir()),
            model_path: None,
            model_url: None,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU_THRESHOLD,
            min_box_area: DEFAULT_MIN_BOX_AREA,
            sample_every: 1,
            tracking: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("cropsort"))
        .unwrap_or_else(|| PathBuf::from("cropsort-data"))
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cropsort").join("settings.json"))
    }

    /// Loads `path`, or the default location when `None`. An absent or
    /// unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).or_else(Self::config_path);
        let Some(path) = path else {
            return Self::default();
        };
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid settings file {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            model: ModelSource {
                path: self.model_path.clone(),
                url: self.model_url.clone(),
            },
            thresholds: DetectorThresholds {
                confidence: self.confidence,
                iou: self.iou,
            },
            tracking: self.tracking,
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            min_box_area: self.min_box_area,
            sample_every: self.sample_every,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(format!("IoU must be between 0.0 and 1.0, got {}", self.iou));
        }
        if self.sample_every == 0 {
            return Err("Sample interval must be at least 1".into());
        }
        Ok(())
    }
}
