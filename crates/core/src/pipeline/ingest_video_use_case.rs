use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::detection::domain::person_detector::{
    DetectorBackend, IdentityMode, PersonDetection, PersonDetector,
};
use crate::pipeline::box_filter::BoxFilter;
use crate::pipeline::frame_outcome::{FrameOutcome, IngestDiagnostics, SkipReason};
use crate::pipeline::ingest_config::IngestConfig;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::session::domain::image_uri::ImageUri;
use crate::session::domain::person_map::PersonMap;
use crate::session::domain::session_error::SessionError;
use crate::session::infrastructure::fs_session_store::FsSessionStore;
use crate::shared::constants::GROUP_PREFIX;
use crate::shared::frame::Frame;
use crate::video::domain::crop_writer::CropWriter;
use crate::video::domain::video_reader::VideoReader;

/// Progress callback: `(frames_done, total_frames) -> keep_going`.
pub type ProgressFn = Box<dyn Fn(usize, usize) -> bool + Send>;

/// What a successful ingest hands back. Also the body of the ingest summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestOutput {
    pub session_id: String,
    pub persons: PersonMap,
    pub diagnostics: IngestDiagnostics,
}

/// Decomposes an uploaded video into a new session of per-person crop groups.
///
/// Frame- and detection-level problems are recorded as skips and never stop
/// the run. Anything that leaves the session unusable (no directory, upload
/// not stored, unreadable container, snapshot not written, cancellation)
/// removes the session directory before the error is returned.
pub struct IngestVideoUseCase {
    reader: Box<dyn VideoReader>,
    backend: DetectorBackend,
    crop_writer: Box<dyn CropWriter>,
    store: Arc<FsSessionStore>,
    config: IngestConfig,
    logger: Box<dyn PipelineLogger>,
    on_progress: Option<ProgressFn>,
    cancelled: Arc<AtomicBool>,
}

impl IngestVideoUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        backend: DetectorBackend,
        crop_writer: Box<dyn CropWriter>,
        store: Arc<FsSessionStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            reader,
            backend,
            crop_writer,
            store,
            config,
            logger: Box::new(NullPipelineLogger),
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Runs the whole ingest for one uploaded video.
    pub fn execute(&mut self, video: &[u8]) -> Result<IngestOutput, SessionError> {
        let session_id = self
            .store
            .create_session()
            .map_err(|e| SessionError::Processing(e.to_string()))?;

        match self.run(&session_id, video) {
            Ok(output) => {
                if let Err(e) = self.store.write_summary(&session_id, &output) {
                    log::warn!("Could not write ingest summary for {session_id}: {e}");
                }
                Ok(output)
            }
            Err(e) => {
                self.reader.close();
                if let Err(cleanup) = self.store.remove_session(&session_id) {
                    log::error!("Could not remove failed session {session_id}: {cleanup}");
                }
                log::warn!("Ingest of session {session_id} failed: {e}");
                Err(SessionError::Processing(e.to_string()))
            }
        }
    }

    fn run(
        &mut self,
        session_id: &str,
        video: &[u8],
    ) -> Result<IngestOutput, Box<dyn std::error::Error>> {
        let session_dir = self.store.session_dir(session_id)?;
        let upload_path = self.store.write_upload(session_id, video)?;

        let mut persons = PersonMap::new();
        let mut diagnostics = IngestDiagnostics::default();

        match &mut self.backend {
            DetectorBackend::Unavailable { reason } => {
                self.logger.info(&format!(
                    "Person detection unavailable ({reason}); session {session_id} has no groups"
                ));
            }
            DetectorBackend::Available(detector) => {
                let metadata = self.reader.open(&upload_path)?;
                self.logger.info(&format!(
                    "Ingesting {}x{} video ({} frames) into session {session_id}",
                    metadata.width, metadata.height, metadata.total_frames
                ));

                let total = metadata.total_frames;
                let filter = BoxFilter::new(self.config.min_box_area);
                let sample_every = self.config.sample_every.max(1);
                let mut naming = GroupNaming::new(detector.identity_mode());
                let mut sink = CropSink {
                    session_id,
                    session_dir: &session_dir,
                    writer: &*self.crop_writer,
                    persons: &mut persons,
                };

                for (position, frame_result) in self.reader.frames().enumerate() {
                    if self.cancelled.load(Ordering::Relaxed) {
                        return Err("Cancelled".into());
                    }

                    let (frame_index, outcome) = match frame_result {
                        Err(e) => {
                            log::debug!("Frame at position {position} did not decode: {e}");
                            (None, FrameOutcome::Skipped(SkipReason::DecodeError))
                        }
                        Ok(frame) if naming.samples() && frame.index() % sample_every != 0 => {
                            (Some(frame.index()), FrameOutcome::NotSampled)
                        }
                        Ok(frame) => {
                            let started = Instant::now();
                            let outcome =
                                process_frame(&mut **detector, &frame, &filter, &mut naming, &mut sink);
                            self.logger
                                .timing("frame", started.elapsed().as_secs_f64() * 1000.0);
                            (Some(frame.index()), outcome)
                        }
                    };

                    if let FrameOutcome::Skipped(reason) = outcome {
                        self.logger.skipped(frame_index, reason);
                    }
                    diagnostics.record(&outcome);

                    let done = position + 1;
                    self.logger.progress(done, total.max(done));
                    if let Some(ref callback) = self.on_progress {
                        if !callback(done, total) {
                            self.cancelled.store(true, Ordering::Relaxed);
                            return Err("Cancelled".into());
                        }
                    }
                }
                self.reader.close();
            }
        }

        self.store.write_snapshot(session_id, &persons)?;
        self.logger.summary(&diagnostics);
        log::info!(
            "Session {session_id}: {} groups, {} crops",
            persons.len(),
            diagnostics.crops_written
        );

        Ok(IngestOutput {
            session_id: session_id.to_string(),
            persons,
            diagnostics,
        })
    }
}

/// Chooses group and file names for accepted detections.
enum GroupNaming {
    /// `person_<track>` / `f<frame>_id<track>.jpg`.
    Tracking,
    /// Every detection is a new `person_<n>` / `f<frame>_p<n>.jpg`.
    PerFrame { next_id: u64 },
}

impl GroupNaming {
    fn new(mode: IdentityMode) -> Self {
        match mode {
            IdentityMode::Tracking => Self::Tracking,
            IdentityMode::PerFrame => Self::PerFrame { next_id: 0 },
        }
    }

    /// Sampling only applies without tracking; a tracker needs every frame.
    fn samples(&self) -> bool {
        matches!(self, Self::PerFrame { .. })
    }

    fn assign(
        &mut self,
        frame_index: usize,
        detection: &PersonDetection,
    ) -> Result<(String, String), SkipReason> {
        match self {
            Self::Tracking => {
                let id = detection.track_id.ok_or(SkipReason::MissingTrackId)?;
                Ok((
                    format!("{GROUP_PREFIX}{id}"),
                    format!("f{frame_index}_id{id}.jpg"),
                ))
            }
            Self::PerFrame { next_id } => {
                let id = *next_id;
                *next_id += 1;
                Ok((
                    format!("{GROUP_PREFIX}{id}"),
                    format!("f{frame_index}_p{id}.jpg"),
                ))
            }
        }
    }
}

/// Writes crops into the session and records their URIs.
struct CropSink<'a> {
    session_id: &'a str,
    session_dir: &'a Path,
    writer: &'a dyn CropWriter,
    persons: &'a mut PersonMap,
}

impl CropSink<'_> {
    fn save(
        &mut self,
        group: &str,
        file: &str,
        crop: &Frame,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.writer
            .write(&self.session_dir.join(group).join(file), crop)?;
        self.persons
            .entry(group.to_string())
            .or_default()
            .push(ImageUri::new(self.session_id, group, file).to_string());
        Ok(())
    }
}

fn process_frame(
    detector: &mut dyn PersonDetector,
    frame: &Frame,
    filter: &BoxFilter,
    naming: &mut GroupNaming,
    sink: &mut CropSink<'_>,
) -> FrameOutcome {
    let detections = match detector.detect(frame) {
        Ok(detections) => detections,
        Err(e) => {
            log::debug!("Detector failed on frame {}: {e}", frame.index());
            return FrameOutcome::Skipped(SkipReason::DetectorError);
        }
    };

    let mut crops = 0;
    let mut rejected = Vec::new();
    for detection in &detections {
        match crop_detection(frame, detection, filter, naming, sink) {
            Ok(()) => crops += 1,
            Err(reason) => {
                log::debug!("Frame {}: dropped detection ({reason})", frame.index());
                rejected.push(reason);
            }
        }
    }
    FrameOutcome::Processed { crops, rejected }
}

fn crop_detection(
    frame: &Frame,
    detection: &PersonDetection,
    filter: &BoxFilter,
    naming: &mut GroupNaming,
    sink: &mut CropSink<'_>,
) -> Result<(), SkipReason> {
    let rect = filter.accept(&detection.bbox, frame.width(), frame.height())?;
    let (group, file) = naming.assign(frame.index(), detection)?;
    let crop = frame.crop(&rect).map_err(|e| {
        log::debug!("Crop {rect:?} failed: {e}");
        SkipReason::CropFailed
    })?;
    sink.save(&group, &file, &crop).map_err(|e| {
        log::debug!("Writing {group}/{file} failed: {e}");
        SkipReason::WriteFailed
    })
}
