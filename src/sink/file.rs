//! Local file frame sink.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSink;
use super::FrameSink;
use crate::frame::{Frame, VideoInfo};

/// Writes annotated frames to a local MPEG-4 file.
pub struct FileSink {
    backend: SinkBackend,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
    closed: bool,
}

enum SinkBackend {
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSink),
    #[cfg(not(feature = "video-ffmpeg"))]
    #[allow(dead_code)]
    Unavailable(std::convert::Infallible),
}

impl FileSink {
    /// Create the output container. `info.fps` must already be a usable rate.
    pub fn create(path: &Path, info: &VideoInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(anyhow!(
                "cannot create {}x{} output video",
                info.width,
                info.height
            ));
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            let backend = SinkBackend::Ffmpeg(FfmpegFileSink::new(path, info)?);
            log::debug!(
                "FileSink: writing {} ({}x{} @ {:.2} fps, {})",
                path.display(),
                info.width,
                info.height,
                info.fps,
                super::OUTPUT_FOURCC
            );
            Ok(Self {
                backend,
                path: path.to_path_buf(),
                width: info.width,
                height: info.height,
                frames_written: 0,
                closed: false,
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(anyhow!(
                "cannot create '{}': video encoding requires the video-ffmpeg feature",
                path.display()
            ))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for FileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("write to closed sink {}", self.path.display()));
        }
        if frame.width() != self.width || frame.height() != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match output {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        match &mut self.backend {
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.write(frame)?,
            #[cfg(not(feature = "video-ffmpeg"))]
            SinkBackend::Unavailable(never) => match *never {},
        }
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &mut self.backend {
            #[cfg(feature = "video-ffmpeg")]
            SinkBackend::Ffmpeg(sink) => sink.finish(),
            #[cfg(not(feature = "video-ffmpeg"))]
            SinkBackend::Unavailable(never) => match *never {},
        }
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!(
                "FileSink: failed to finalize {}: {:#}",
                self.path.display(),
                err
            );
        }
    }
}
