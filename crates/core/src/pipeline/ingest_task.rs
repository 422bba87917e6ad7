use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::pipeline::frame_outcome::{IngestDiagnostics, SkipReason};
use crate::pipeline::ingest_video_use_case::{IngestOutput, IngestVideoUseCase};
use crate::pipeline::pipeline_logger::{LogPipelineLogger, PipelineLogger};
use crate::session::domain::session_error::SessionError;

/// Events emitted by a running [`IngestTask`]. `Finished` is always last.
#[derive(Debug)]
pub enum IngestEvent {
    Progress { current: usize, total: usize },
    FrameSkipped { frame_index: Option<usize>, reason: SkipReason },
    Finished(Result<IngestOutput, SessionError>),
}

/// An ingest running on its own worker thread.
///
/// Observers read [`IngestEvent`]s from [`IngestTask::events`]; [`IngestTask::cancel`]
/// stops the run at the next frame boundary and rolls the session back.
pub struct IngestTask {
    events: Receiver<IngestEvent>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IngestTask {
    pub fn spawn(use_case: IngestVideoUseCase, video: Vec<u8>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));

        let progress_tx = tx.clone();
        let mut use_case = use_case
            .with_cancel_flag(cancelled.clone())
            .with_logger(Box::new(ChannelPipelineLogger::new(tx.clone())))
            .with_progress(Box::new(move |current, total| {
                let _ = progress_tx.send(IngestEvent::Progress { current, total });
                true
            }));

        let handle = std::thread::spawn(move || {
            let result = use_case.execute(&video);
            let _ = tx.send(IngestEvent::Finished(result));
        });

        Self {
            events: rx,
            cancelled,
            handle: Some(handle),
        }
    }

    pub fn events(&self) -> &Receiver<IngestEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Blocks until the worker finishes, discarding intermediate events.
    pub fn wait(mut self) -> Result<IngestOutput, SessionError> {
        let mut outcome = None;
        for event in self.events.iter() {
            if let IngestEvent::Finished(result) = event {
                outcome = Some(result);
                break;
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Ingest worker panicked");
            }
        }
        outcome.unwrap_or_else(|| {
            Err(SessionError::Processing(
                "ingest worker exited without a result".into(),
            ))
        })
    }
}

/// Forwards frame skips to the task's event channel and everything else to
/// the regular log-backed logger.
struct ChannelPipelineLogger {
    tx: Sender<IngestEvent>,
    inner: LogPipelineLogger,
}

impl ChannelPipelineLogger {
    fn new(tx: Sender<IngestEvent>) -> Self {
        Self {
            tx,
            inner: LogPipelineLogger::default(),
        }
    }
}

impl PipelineLogger for ChannelPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.inner.progress(current, total);
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.inner.timing(stage, duration_ms);
    }

    fn skipped(&mut self, frame_index: Option<usize>, reason: SkipReason) {
        self.inner.skipped(frame_index, reason);
        let _ = self.tx.send(IngestEvent::FrameSkipped {
            frame_index,
            reason,
        });
    }

    fn info(&mut self, message: &str) {
        self.inner.info(message);
    }

    fn summary(&self, diagnostics: &IngestDiagnostics) {
        self.inner.summary(diagnostics);
    }
}
