//! YOLOv8 person detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference, class filtering, NMS and,
//! when a tracker is attached, ByteTrack identity assignment.
use std::path::Path;

use crate::detection::domain::person_detector::{IdentityMode, PersonDetection, PersonDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::PERSON_CLASS_ID;
use crate::shared::frame::Frame;

use super::bytetrack_tracker::ByteTracker;
use super::math::bbox_iou;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Values per candidate before the class scores: cx, cy, w, h.
const BOX_VALUES: usize = 4;

/// Thresholds passed through to the model's post-processing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorThresholds {
    pub confidence: f64,
    pub iou: f64,
}

/// YOLO person detector backed by an ONNX Runtime session.
pub struct OnnxYoloPersonDetector {
    session: ort::session::Session,
    tracker: Option<ByteTracker>,
    thresholds: DetectorThresholds,
    input_size: u32,
}

impl OnnxYoloPersonDetector {
    /// Load a YOLO ONNX model. Without a tracker the detector runs in
    /// [`IdentityMode::PerFrame`].
    pub fn new(
        model_path: &Path,
        tracker: Option<ByteTracker>,
        thresholds: DetectorThresholds,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;

        // NCHW: [1, 3, H, W]
        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded person detector {} (input {input_size}px, tracking: {})",
            model_path.display(),
            tracker.is_some()
        );

        Ok(Self {
            session,
            tracker,
            thresholds,
            input_size,
        })
    }
}

impl PersonDetector for OnnxYoloPersonDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<PersonDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, geometry) = letterbox(frame, self.input_size)?;

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let candidates = parse_candidates(data, &shape, self.thresholds.confidence, &geometry)?;
        let kept = nms(candidates, self.thresholds.iou);

        Ok(match self.tracker.as_mut() {
            Some(tracker) => tracker.assign(kept),
            None => kept,
        })
    }

    fn identity_mode(&self) -> IdentityMode {
        if self.tracker.is_some() {
            IdentityMode::Tracking
        } else {
            IdentityMode::PerFrame
        }
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping from letterboxed model coordinates back to frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` as an NCHW
/// float tensor, padding with YOLO gray (114).
fn letterbox(
    frame: &Frame,
    target_size: u32,
) -> Result<(ndarray::Array4<f32>, Letterbox), Box<dyn std::error::Error>> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err("cannot letterbox an empty frame".into());
    }
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray()?;
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let channels = (frame.channels() as usize).min(3);

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..channels {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    ))
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// Decodes `[1, 4 + classes, anchors]` (or its transpose) into person
/// candidates above `confidence`, in frame coordinates.
///
/// A candidate counts as a person only when "person" is its best class.
fn parse_candidates(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    geometry: &Letterbox,
) -> Result<Vec<PersonDetection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    // Anchors outnumber features in the usual [1, 84, 8400] layout.
    let transposed = shape[1] < shape[2];
    let (num_candidates, num_values) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_values <= BOX_VALUES + PERSON_CLASS_ID {
        return Err(format!("YOLO output has no class scores: {shape:?}").into());
    }
    if data.len() < num_candidates * num_values {
        return Err("YOLO output shorter than its shape".into());
    }

    let value = |i: usize, v: usize| -> f64 {
        if transposed {
            data[v * num_candidates + i] as f64
        } else {
            data[i * num_values + v] as f64
        }
    };

    let mut candidates = Vec::new();
    for i in 0..num_candidates {
        let person_score = value(i, BOX_VALUES + PERSON_CLASS_ID);
        if person_score < confidence {
            continue;
        }
        let best_other = (BOX_VALUES..num_values)
            .filter(|&v| v != BOX_VALUES + PERSON_CLASS_ID)
            .map(|v| value(i, v))
            .fold(f64::MIN, f64::max);
        if best_other > person_score {
            continue;
        }

        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        let (x1, y1) = geometry.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = geometry.unmap(cx + w / 2.0, cy + h / 2.0);

        candidates.push(PersonDetection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence: person_score,
            track_id: None,
        });
    }
    Ok(candidates)
}

/// Greedy NMS: highest confidence first, suppress overlaps above `iou_thresh`.
fn nms(mut dets: Vec<PersonDetection>, iou_thresh: f64) -> Vec<PersonDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<PersonDetection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| bbox_iou(&k.bbox.as_array(), &det.bbox.as_array()) > iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
