//! Pairing of frame source and frame sink factories.
//!
//! The analyzer and the live streamer never open containers directly; they go
//! through a `MediaBackend`, so the container format can be swapped (or faked
//! in tests) without touching pipeline code.

use std::path::Path;

use anyhow::Result;

use crate::frame::VideoInfo;
use crate::ingest::{FileSource, FrameSource};
use crate::sink::{FileSink, FrameSink};

/// Opens decoders and encoders for video containers on the local filesystem.
pub trait MediaBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Open an existing container for sequential decoding.
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>>;

    /// Create a new container for sequential encoding.
    fn create_sink(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn FrameSink>>;
}

/// Production backend: FFmpeg decoding and MPEG-4 encoding of local files.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileMedia;

impl MediaBackend for FileMedia {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FileSource::open(path)?))
    }

    fn create_sink(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(FileSink::create(path, info)?))
    }
}
