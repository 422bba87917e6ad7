use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::shared::constants::CROP_JPEG_QUALITY;
use crate::shared::frame::Frame;
use crate::video::domain::crop_writer::CropWriter;

/// Writes crops as baseline JPEG using the `image` crate.
pub struct JpegCropWriter {
    quality: u8,
}

impl JpegCropWriter {
    pub fn new() -> Self {
        Self::with_quality(CROP_JPEG_QUALITY)
    }

    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegCropWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CropWriter for JpegCropWriter {
    fn write(&self, path: &Path, crop: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let color = match crop.channels() {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            n => return Err(format!("cannot encode {n}-channel crop as JPEG").into()),
        };

        let new_dir = path.parent().filter(|dir| !dir.exists());
        if let Some(dir) = new_dir {
            fs::create_dir_all(dir)?;
        }

        let written = fs::File::create(path)
            .map_err(Into::into)
            .and_then(|file| self.encode_to(file, crop, color));
        if written.is_err() {
            let _ = fs::remove_file(path);
            if let Some(dir) = new_dir {
                let _ = fs::remove_dir(dir);
            }
        }
        written
    }
}

impl JpegCropWriter {
    /// Encodes `crop` into `sink` and flushes it, so a short write surfaces
    /// here instead of being lost when the buffer is dropped.
    fn encode_to<W: Write>(
        &self,
        sink: W,
        crop: &Frame,
        color: ExtendedColorType,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut buffered = BufWriter::new(sink);
        JpegEncoder::new_with_quality(&mut buffered, self.quality).encode(
            crop.data(),
            crop.width(),
            crop.height(),
            color,
        )?;
        buffered.into_inner().map_err(|e| e.into_error())?.flush()?;
        Ok(())
    }
}
