use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Decoding errors for a single frame. A reader may yield one and then keep
/// producing frames; callers decide whether the error is fatal.
pub type FrameResult = Result<Frame, Box<dyn std::error::Error>>;

/// Frame iterator over a video file.
///
/// Implementations own codec and container details; the ingest pipeline
/// only sees `Frame` and `VideoMetadata`.
pub trait VideoReader: Send {
    /// Opens a video file and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over frames in decode order, indexed from zero.
    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_>;

    /// Releases any resources held by the reader.
    fn close(&mut self);
}
