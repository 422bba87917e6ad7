use std::collections::BTreeMap;

use serde::Serialize;

/// Why a frame or a single detection produced no crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The reader could not decode the frame.
    DecodeError,
    /// The detector returned an error for the frame.
    DetectorError,
    /// A coordinate was NaN or infinite.
    NonFiniteBox,
    /// Zero or negative width/height after clamping.
    DegenerateBox,
    /// Smaller than the configured minimum area.
    BelowMinArea,
    /// Tracking mode, but the detection carried no track id.
    MissingTrackId,
    /// Copying the pixels out of the frame failed.
    CropFailed,
    /// Encoding or writing the crop file failed.
    WriteFailed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::DecodeError => "decode error",
            Self::DetectorError => "detector error",
            Self::NonFiniteBox => "non-finite box",
            Self::DegenerateBox => "degenerate box",
            Self::BelowMinArea => "below minimum area",
            Self::MissingTrackId => "missing track id",
            Self::CropFailed => "crop failed",
            Self::WriteFailed => "write failed",
        };
        f.write_str(text)
    }
}

/// Result of pushing one frame through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Detection ran. `rejected` lists detections that yielded no crop.
    Processed { crops: usize, rejected: Vec<SkipReason> },
    /// Frame left out by the sampling interval.
    NotSampled,
    /// The whole frame was dropped.
    Skipped(SkipReason),
}

/// Per-ingest counters, returned with the person map and written into
/// the ingest summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestDiagnostics {
    pub frames_seen: usize,
    pub frames_processed: usize,
    pub frames_not_sampled: usize,
    pub frames_skipped: usize,
    pub crops_written: usize,
    pub detections_rejected: usize,
    /// Frame- and detection-level skips by reason.
    pub skips: BTreeMap<SkipReason, usize>,
}

impl IngestDiagnostics {
    pub fn record(&mut self, outcome: &FrameOutcome) {
        self.frames_seen += 1;
        match outcome {
            FrameOutcome::Processed { crops, rejected } => {
                self.frames_processed += 1;
                self.crops_written += crops;
                self.detections_rejected += rejected.len();
                for reason in rejected {
                    *self.skips.entry(*reason).or_default() += 1;
                }
            }
            FrameOutcome::NotSampled => self.frames_not_sampled += 1,
            FrameOutcome::Skipped(reason) => {
                self.frames_skipped += 1;
                *self.skips.entry(*reason).or_default() += 1;
            }
        }
    }

    pub fn skip_count(&self, reason: SkipReason) -> usize {
        self.skips.get(&reason).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_aggregates_outcomes() {
        let mut diag = IngestDiagnostics::default();
        diag.record(&FrameOutcome::Processed {
            crops: 2,
            rejected: vec![SkipReason::BelowMinArea, SkipReason::BelowMinArea],
        });
        diag.record(&FrameOutcome::Skipped(SkipReason::DecodeError));
        diag.record(&FrameOutcome::NotSampled);
        diag.record(&FrameOutcome::Processed {
            crops: 0,
            rejected: vec![SkipReason::WriteFailed],
        });

        assert_eq!(diag.frames_seen, 4);
        assert_eq!(diag.frames_processed, 2);
        assert_eq!(diag.frames_skipped, 1);
        assert_eq!(diag.frames_not_sampled, 1);
        assert_eq!(diag.crops_written, 2);
        assert_eq!(diag.detections_rejected, 3);
        assert_eq!(diag.skip_count(SkipReason::BelowMinArea), 2);
        assert_eq!(diag.skip_count(SkipReason::DecodeError), 1);
        assert_eq!(diag.skip_count(SkipReason::DetectorError), 0);
    }

    #[test]
    fn test_serializes_reasons_as_keys() {
        let mut diag = IngestDiagnostics::default();
        diag.record(&FrameOutcome::Skipped(SkipReason::DetectorError));
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["skips"]["detector_error"], 1);
        assert_eq!(json["frames_skipped"], 1);
    }
}
