use ndarray::{s, ArrayView3};

use crate::shared::bounding_box::PixelRect;

/// A decoded video frame: contiguous RGB bytes in row-major order.
///
/// `index` is the position of the frame in decode order and ends up in
/// crop filenames, so readers must number frames from zero without gaps.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> Result<ArrayView3<'_, u8>, ndarray::ShapeError> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
    }

    /// Copies the pixels inside `rect` into a new frame carrying the same index.
    ///
    /// `rect` must already be clamped to the frame; anything reaching past the
    /// right or bottom edge is reported as an error rather than truncated.
    pub fn crop(&self, rect: &PixelRect) -> Result<Frame, Box<dyn std::error::Error>> {
        let x2 = rect.x as usize + rect.width as usize;
        let y2 = rect.y as usize + rect.height as usize;
        if rect.width == 0 || rect.height == 0 {
            return Err("crop rectangle is empty".into());
        }
        if x2 > self.width as usize || y2 > self.height as usize {
            return Err(format!(
                "crop {rect:?} exceeds frame bounds {}x{}",
                self.width, self.height
            )
            .into());
        }

        let view = self.as_ndarray()?;
        let window = view.slice(s![rect.y as usize..y2, rect.x as usize..x2, ..]);
        let data: Vec<u8> = window.iter().copied().collect();

        Ok(Frame::new(
            data,
            rect.width,
            rect.height,
            self.channels,
            self.index,
        ))
    }
}
