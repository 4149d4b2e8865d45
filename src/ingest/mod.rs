//! Frame sources.
//!
//! A source opens a video container and yields its frames in decode order as
//! packed RGB24 `Frame`s. The sequence is lazy, finite and single-pass:
//! - End of stream is signalled by `None`, never by an error.
//! - A decode failure mid-stream is logged and ends the sequence the same way.
//! - Dropping the source releases the container, whether or not it was exhausted.

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::FileSource;

use crate::frame::{Frame, VideoInfo};

/// Sequential decoder over one video container.
pub trait FrameSource: Iterator<Item = Frame> {
    /// Geometry and frame rate as reported by the container.
    fn info(&self) -> VideoInfo;

    /// Frames yielded so far.
    fn frames_read(&self) -> u64;
}
