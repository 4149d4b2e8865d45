//! Frame sinks.
//!
//! A sink is opened once per analysis with the geometry and frame rate of
//! the source, appends frames in call order and must be closed to finalize
//! the container. `close` is idempotent and dropping an unclosed sink closes
//! it best-effort, so an aborted analysis never leaves an unfinalized file.

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::FileSink;

use anyhow::Result;

use crate::frame::Frame;

/// FourCC of the codec used for output containers.
pub const OUTPUT_FOURCC: &str = "mp4v";

/// MPEG-4 Part 2 stores time base terms in 16 bits.
pub const MAX_TIMEBASE_TERM: i64 = 65535;

/// Sequential encoder writing one output container.
pub trait FrameSink {
    /// Append one frame. Frame dimensions must match the sink's.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Finalize the container. Calls after the first are no-ops.
    fn close(&mut self) -> Result<()>;

    /// Frames written so far.
    fn frames_written(&self) -> u64;
}

/// Frame rate as `(num, den)`, both within `MAX_TIMEBASE_TERM`.
///
/// Walks the continued-fraction convergents of `fps` and keeps the last one
/// whose terms fit, so common NTSC rates stay exact (29.97 -> 2997/100) and
/// irregular averages such as 120.017 are approximated instead of rejected.
pub fn frame_rate_ratio(fps: f64) -> (i32, i32) {
    if !fps.is_finite() || fps <= 0.0 {
        return (crate::frame::FALLBACK_FPS as i32, 1);
    }
    let (mut prev_num, mut num) = (0i64, 1i64);
    let (mut prev_den, mut den) = (1i64, 0i64);
    let mut x = fps;
    for _ in 0..64 {
        let a = x.floor();
        let next_num = a as i64 * num + prev_num;
        let next_den = a as i64 * den + prev_den;
        if next_num > MAX_TIMEBASE_TERM || next_den > MAX_TIMEBASE_TERM {
            break;
        }
        (prev_num, num) = (num, next_num);
        (prev_den, den) = (den, next_den);

        let frac = x - a;
        if frac < 1e-9 || (num as f64 / den as f64 - fps).abs() < 1e-9 {
            break;
        }
        x = 1.0 / frac;
    }
    if den == 0 {
        return (MAX_TIMEBASE_TERM as i32, 1);
    }
    (num as i32, den as i32)
}
