//! Local file frame source using FFmpeg.
//!
//! Decodes the best video track of a container and converts every frame to
//! packed RGB24. The decoder is flushed at end of input so trailing frames
//! held back for reordering are still delivered.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::{Frame, VideoInfo};

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    info: VideoInfo,
    flushed: bool,
}

impl FfmpegFileSource {
    pub(crate) fn new(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video container '{}'", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", path.display()))?;
        let stream_index = input_stream.index();
        let fps = f64::from(input_stream.avg_frame_rate());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let info = VideoInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            info,
            flushed: false,
        })
    }

    pub(crate) fn info(&self) -> VideoInfo {
        self.info
    }

    /// Decode the next frame, or `None` once the container is exhausted.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                return frame_from_rgb(&rgb_frame).map(Some);
            }
            if self.flushed {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder
                        .send_eof()
                        .context("flush ffmpeg decoder")?;
                    self.flushed = true;
                }
            }
        }
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }
}

fn frame_from_rgb(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Frame::new(pixels.to_vec(), width, height);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Frame::new(pixels, width, height)
}
