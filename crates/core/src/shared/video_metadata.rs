use std::path::PathBuf;

/// Stream properties reported by a [`VideoReader`](crate::video::domain::video_reader::VideoReader)
/// when it opens a source. `total_frames` is 0 when the container does not
/// advertise a frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub source_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_frame_count_is_zero() {
        let meta = VideoMetadata {
            width: 640,
            height: 480,
            fps: 25.0,
            total_frames: 0,
            source_path: None,
        };
        assert_eq!(meta.total_frames, 0);
        assert_eq!(meta.clone(), meta);
    }
}
