//! Simplified ByteTrack multi-object tracker for person boxes.
//!
//! Confident detections are associated with live tracks first; weaker ones
//! may only extend tracks that are still unmatched and never open a new
//! identity. Tracks survive up to `max_lost` frames without a match so a
//! person briefly occluded keeps the same id.
use std::collections::HashSet;

use crate::detection::domain::person_detector::PersonDetection;

use super::math::bbox_iou;

const DEFAULT_HIGH_THRESH: f64 = 0.5;
const DEFAULT_MATCH_THRESH: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Detections at or above this score may start new tracks.
    pub high_thresh: f64,
    /// Minimum IoU between a track and a detection to associate them.
    pub match_thresh: f64,
    pub max_lost: usize,
}

impl TrackerConfig {
    pub fn with_max_lost(max_lost: usize) -> Self {
        Self {
            high_thresh: DEFAULT_HIGH_THRESH,
            match_thresh: DEFAULT_MATCH_THRESH,
            max_lost,
        }
    }
}

#[derive(Clone, Debug)]
struct LiveTrack {
    id: u32,
    bbox: [f64; 4],
    frames_lost: usize,
    matched: bool,
}

pub struct ByteTracker {
    config: TrackerConfig,
    tracks: Vec<LiveTrack>,
    next_id: u32,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Associates this frame's detections with tracks and returns the
    /// detections that belong to a live track, with `track_id` filled in.
    ///
    /// Weak detections that match no track are dropped.
    pub fn assign(&mut self, detections: Vec<PersonDetection>) -> Vec<PersonDetection> {
        for track in &mut self.tracks {
            track.matched = false;
        }
        let previously_live = self.tracks.len();

        let (strong, weak): (Vec<usize>, Vec<usize>) = (0..detections.len())
            .partition(|&i| detections[i].confidence >= self.config.high_thresh);

        let mut owner: Vec<Option<u32>> = vec![None; detections.len()];

        let strong_matches = self.associate(&strong, &detections);
        let matched_strong: HashSet<usize> = strong_matches.iter().map(|(_, d)| *d).collect();
        self.commit(strong_matches, &detections, &mut owner);

        let weak_matches = self.associate(&weak, &detections);
        self.commit(weak_matches, &detections, &mut owner);

        for &di in strong.iter().filter(|di| !matched_strong.contains(di)) {
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(LiveTrack {
                id,
                bbox: detections[di].bbox.as_array(),
                frames_lost: 0,
                matched: true,
            });
            owner[di] = Some(id);
        }

        for track in self.tracks.iter_mut().take(previously_live) {
            if !track.matched {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.config.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        detections
            .into_iter()
            .zip(owner)
            .filter_map(|(mut det, id)| {
                det.track_id = Some(id?);
                Some(det)
            })
            .collect()
    }

    /// Greedy IoU association between unmatched tracks and the given
    /// detection indices, highest overlap first.
    fn associate(&self, candidates: &[usize], detections: &[PersonDetection]) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate().filter(|(_, t)| !t.matched) {
            for &di in candidates {
                let score = bbox_iou(&track.bbox, &detections[di].bbox.as_array());
                if score >= self.config.match_thresh {
                    pairs.push((ti, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_tracks = HashSet::new();
        let mut used_dets = HashSet::new();
        let mut matches = Vec::new();
        for (ti, di, _) in pairs {
            if !used_tracks.contains(&ti) && !used_dets.contains(&di) {
                used_tracks.insert(ti);
                used_dets.insert(di);
                matches.push((ti, di));
            }
        }
        matches
    }

    fn commit(
        &mut self,
        matches: Vec<(usize, usize)>,
        detections: &[PersonDetection],
        owner: &mut [Option<u32>],
    ) {
        for (ti, di) in matches {
            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox.as_array();
            track.frames_lost = 0;
            track.matched = true;
            owner[di] = Some(track.id);
        }
    }
}
