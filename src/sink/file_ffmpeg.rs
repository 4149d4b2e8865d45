//! MPEG-4 Part 2 encoder writing `.mp4` files through FFmpeg.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::util::format::pixel::Pixel;

use super::frame_rate_ratio;
use crate::frame::{Frame, VideoInfo};

pub(crate) struct FfmpegFileSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
}

impl FfmpegFileSink {
    pub(crate) fn new(path: &Path, info: &VideoInfo) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create output container '{}'", path.display()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg build has no MPEG-4 encoder"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let (num, den) = frame_rate_ratio(info.fps);
        let frame_rate = ffmpeg::Rational::new(num, den);
        let encoder_time_base = frame_rate.invert();

        let stream_index = {
            let mut stream = output
                .add_stream(codec)
                .context("add video stream to output")?;
            stream.set_time_base(encoder_time_base);
            stream.index()
        };

        let mut context = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create MPEG-4 encoder context")?;
        context.set_width(info.width);
        context.set_height(info.height);
        context.set_format(Pixel::YUV420P);
        context.set_time_base(encoder_time_base);
        context.set_frame_rate(Some(frame_rate));
        if global_header {
            context.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = context
            .open_as(codec)
            .context("open MPEG-4 encoder")?;

        output
            .stream_mut(stream_index)
            .ok_or_else(|| anyhow!("output stream vanished"))?
            .set_parameters(&encoder);
        output
            .write_header()
            .context("write output container header")?;
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| anyhow!("output stream vanished"))?
            .time_base();

        let scaler = ffmpeg::software::scaling::context::Context::get(
            Pixel::RGB24,
            info.width,
            info.height,
            Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width: info.width,
            height: info.height,
            next_pts: 0,
        })
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> Result<()> {
        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let pixels = frame.pixels();
        let plane = rgb.data_mut(0);
        for row in 0..self.height as usize {
            let src = &pixels[row * row_bytes..(row + 1) * row_bytes];
            plane[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("scale frame to YUV420P")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to MPEG-4 encoder")?;
        self.write_packets()
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof().context("flush MPEG-4 encoder")?;
        self.write_packets()?;
        self.output
            .write_trailer()
            .context("write output container trailer")
    }

    fn write_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}
