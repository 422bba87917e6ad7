use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::{FrameResult, VideoReader};

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec) and
/// converts each one to packed RGB24.
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    stream_index: usize,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            stream_index: 0,
        }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened {} ({}x{}, {:.2} fps, {} frames)",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.total_frames
        );

        self.stream_index = stream_index;
        self.input_ctx = Some(ictx);

        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        let stream_index = self.stream_index;
        let Some(ictx) = self.input_ctx.as_mut() else {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        };
        match FfmpegFrameIter::new(ictx, stream_index) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Reading,
    Draining,
    Finished,
}

/// Pulls packets on demand and yields one RGB frame per decoded picture.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    next_index: usize,
    state: DecodeState,
}

impl<'a> FfmpegFrameIter<'a> {
    fn new(
        ictx: &'a mut ffmpeg_next::format::context::Input,
        stream_index: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let parameters = ictx
            .stream(stream_index)
            .ok_or("video stream disappeared after open")?
            .parameters();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters)?
            .decoder()
            .video()?;
        let scaler = decoder.converter(ffmpeg_next::format::Pixel::RGB24)?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            next_index: 0,
            state: DecodeState::Reading,
        })
    }

    /// Feeds the decoder one packet of our stream, or EOF once the container
    /// runs dry.
    fn feed(&mut self) {
        match self.ictx.packets().next() {
            Some((stream, packet)) if stream.index() == self.stream_index => {
                if let Err(e) = self.decoder.send_packet(&packet) {
                    log::debug!("Dropping undecodable packet: {e}");
                }
            }
            Some(_) => {}
            None => {
                if let Err(e) = self.decoder.send_eof() {
                    log::debug!("Decoder refused EOF: {e}");
                }
                self.state = DecodeState::Draining;
            }
        }
    }

    fn receive(&mut self) -> Option<FrameResult> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;

        let index = self.next_index;
        self.next_index += 1;

        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb) {
            return Some(Err(format!("frame {index}: {e}").into()));
        }
        let (width, height) = (rgb.width(), rgb.height());
        Some(Ok(Frame::new(packed_rgb(&rgb), width, height, 3, index)))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = FrameResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state == DecodeState::Finished {
                return None;
            }
            if let Some(result) = self.receive() {
                return Some(result);
            }
            match self.state {
                DecodeState::Reading => self.feed(),
                _ => self.state = DecodeState::Finished,
            }
        }
    }
}

/// Strips the per-row stride padding from an RGB24 frame.
fn packed_rgb(rgb: &ffmpeg_next::util::frame::video::Video) -> Vec<u8> {
    let row_bytes = rgb.width() as usize * 3;
    rgb.data(0)
        .chunks(rgb.stride(0))
        .take(rgb.height() as usize)
        .flat_map(|row| &row[..row_bytes])
        .copied()
        .collect()
}
