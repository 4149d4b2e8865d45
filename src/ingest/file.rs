//! Local file frame source.
//!
//! `FileSource` decodes a video file from the local filesystem. Only plain
//! paths are accepted; URL schemes are rejected before anything is opened.

use std::path::Path;

use anyhow::{anyhow, Result};

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::frame::{Frame, VideoInfo};

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    frames_read: u64,
    finished: bool,
}

enum FileBackend {
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    #[cfg(not(feature = "video-ffmpeg"))]
    #[allow(dead_code)]
    Unavailable(std::convert::Infallible),
}

impl FileSource {
    /// Open a local video container. Fails when the file cannot be opened or
    /// holds no decodable video track.
    pub fn open(path: &Path) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "file sources only support local paths (no URL schemes)"
            ));
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            let source = FfmpegFileSource::new(path)?;
            log::debug!(
                "FileSource: opened {} ({}x{} @ {:.2} fps)",
                path.display(),
                source.info().width,
                source.info().height,
                source.info().fps
            );
            Ok(Self {
                backend: FileBackend::Ffmpeg(source),
                frames_read: 0,
                finished: false,
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(anyhow!(
                "cannot open '{}': video decoding requires the video-ffmpeg feature",
                path.display()
            ))
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
            #[cfg(not(feature = "video-ffmpeg"))]
            FileBackend::Unavailable(never) => match *never {},
        }
    }
}

impl Iterator for FileSource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => {
                self.frames_read += 1;
                Some(frame)
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                log::warn!(
                    "FileSource: decoding stopped after {} frames: {:#}",
                    self.frames_read,
                    err
                );
                self.finished = true;
                None
            }
        }
    }
}

impl FrameSource for FileSource {
    fn info(&self) -> VideoInfo {
        match &self.backend {
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.info(),
            #[cfg(not(feature = "video-ffmpeg"))]
            FileBackend::Unavailable(never) => match *never {},
        }
    }

    fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

fn is_local_file_path(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    !raw.trim().is_empty() && !raw.contains("://")
}
