use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// One person box reported by a detector for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PersonDetection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// Persistent identity across frames; `None` when the detector cannot
    /// supply one.
    pub track_id: Option<u32>,
}

/// How a detector assigns identity to its detections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityMode {
    /// Detections carry a `track_id` that is stable across frames.
    Tracking,
    /// No persistent identity: every detection is a new person.
    PerFrame,
}

/// Domain interface for person detection.
///
/// Implementations may be stateful (e.g., tracking across frames),
/// hence `&mut self`.
pub trait PersonDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<PersonDetection>, Box<dyn std::error::Error>>;

    fn identity_mode(&self) -> IdentityMode;
}

/// The detector handed to the ingest pipeline.
///
/// `Unavailable` is a supported configuration, not an error: ingest still
/// succeeds and produces a session with no groups.
pub enum DetectorBackend {
    Available(Box<dyn PersonDetector>),
    Unavailable { reason: String },
}

impl DetectorBackend {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl std::fmt::Debug for DetectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(detector) => f
                .debug_tuple("Available")
                .field(&detector.identity_mode())
                .finish(),
            Self::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}
