use std::collections::HashMap;
use std::time::Instant;

use crate::pipeline::frame_outcome::{IngestDiagnostics, SkipReason};

/// Cross-cutting logger for ingest events.
///
/// Decouples the use case from how progress is surfaced (log lines, task
/// events, nothing at all) so the orchestration code stays the same.
pub trait PipelineLogger: Send {
    /// Report frame-level progress.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A whole frame was dropped. `frame_index` is `None` when the frame
    /// never decoded.
    fn skipped(&mut self, frame_index: Option<usize>, reason: SkipReason);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-ingest summary. Default: no-op.
    fn summary(&self, _diagnostics: &IngestDiagnostics) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn skipped(&mut self, _frame_index: Option<usize>, _reason: SkipReason) {}
    fn info(&mut self, _message: &str) {}
}

/// `log`-backed logger with per-stage timing and a summary report.
///
/// Progress output is throttled to every `throttle_frames` frames
/// to avoid excessive I/O on long videos.
pub struct LogPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl LogPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the formatted summary string.
    pub fn summary_string(&self, diagnostics: &IngestDiagnostics) -> String {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Ingest summary ({} frames, {} crops, {:.1}s total):",
            diagnostics.frames_seen,
            diagnostics.crops_written,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        for (reason, count) in &diagnostics.skips {
            lines.push(format!("  skipped ({reason}): {count}"));
        }

        if diagnostics.frames_seen > 0 && elapsed_ms > 0.0 {
            let fps = diagnostics.frames_seen as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        lines.join("\n")
    }

    /// Returns the timing data for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(25)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        if total > 0 && (current % self.throttle_frames == 0 || current == total) {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processing: {current}/{total} frames ({pct:.1}%)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn skipped(&mut self, frame_index: Option<usize>, reason: SkipReason) {
        match frame_index {
            Some(index) => log::debug!("Skipping frame {index}: {reason}"),
            None => log::debug!("Skipping undecodable frame: {reason}"),
        }
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self, diagnostics: &IngestDiagnostics) {
        log::info!("\n\n{}", self.summary_string(diagnostics));
    }
}
