//! Live MJPEG re-streaming of produced videos.
//!
//! `LiveStream` re-decodes an output video and yields one multipart part per
//! frame:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```
//!
//! This is a best-effort view: a container that cannot be opened produces an
//! empty stream, and a frame that fails JPEG encoding is skipped.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::media::MediaBackend;

/// Multipart boundary token used between parts.
pub const MJPEG_BOUNDARY: &str = "frame";

/// Media type of the whole stream response.
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Default JPEG quality for streamed frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encode a frame as baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    if frame.is_empty() {
        return Err(anyhow!(
            "cannot encode {}x{} frame as JPEG",
            frame.width(),
            frame.height()
        ));
    }
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(
            frame.pixels(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )
        .context("JPEG encoding failed")?;
    Ok(out)
}

/// Wrap JPEG bytes in one multipart part.
pub fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Pull-based MJPEG part sequence over one video.
///
/// Nothing is decoded ahead of the consumer. The container is released as
/// soon as the frames run out, or when the stream is dropped early.
pub struct LiveStream {
    source: Option<Box<dyn FrameSource>>,
    quality: u8,
    skipped: u64,
}

impl LiveStream {
    /// Open `path` for streaming. Open failures yield an empty stream.
    pub fn open(media: &dyn MediaBackend, path: &Path, quality: u8) -> Self {
        let source = match media.open_source(path) {
            Ok(source) => Some(source),
            Err(err) => {
                log::debug!("live stream of {} unavailable: {:#}", path.display(), err);
                None
            }
        };
        Self::from_source(source, quality)
    }

    /// Stream frames from an already opened source.
    pub fn from_source(source: Option<Box<dyn FrameSource>>, quality: u8) -> Self {
        Self {
            source,
            quality,
            skipped: 0,
        }
    }

    /// Frames dropped because they could not be encoded.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Iterator for LiveStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(frame) = self.source.as_mut()?.next() else {
                self.source = None;
                return None;
            };
            match encode_jpeg(&frame, self.quality) {
                Ok(jpeg) => return Some(mjpeg_part(&jpeg)),
                Err(err) => {
                    self.skipped += 1;
                    log::debug!("live stream skipped a frame: {:#}", err);
                }
            }
        }
    }
}
