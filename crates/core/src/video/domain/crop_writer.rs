use std::path::Path;

use crate::shared::frame::Frame;

/// Persists a cropped person image.
pub trait CropWriter: Send {
    /// Encodes `crop` to `path`, creating the parent group directory if needed.
    fn write(&self, path: &Path, crop: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
