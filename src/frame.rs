//! Decoded frame container.
//!
//! - `Frame`: packed RGB24 pixels plus dimensions, produced by a `FrameSource`.
//! - `VideoInfo`: container geometry and frame rate, used to open a `FrameSink`.
//!
//! Frames are owned by exactly one pipeline stage at a time. The annotator
//! consumes a frame and hands back the drawn-on version; sinks and encoders
//! only borrow.

use anyhow::{anyhow, Result};

/// Frame rate substituted when a container reports none, zero, or <= 1 fps.
pub const FALLBACK_FPS: f64 = 25.0;

/// One decoded video frame in packed RGB24 layout (row-major, no padding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap packed RGB24 bytes. Fails when the buffer does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A frame filled with a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let data = rgb.iter().copied().cycle().take(len).collect();
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Mutable packed RGB24 bytes. The length is fixed by the dimensions.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// RGB value at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

/// Geometry and timing of a video container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate as reported by the container. May be zero, NaN or infinite.
    pub fps: f64,
}

impl VideoInfo {
    /// Frame rate safe to hand to an encoder.
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 1.0 {
            self.fps
        } else {
            FALLBACK_FPS
        }
    }

    /// Copy of this info with the fallback rate applied.
    pub fn with_fallback_fps(self) -> Self {
        Self {
            fps: self.effective_fps(),
            ..self
        }
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
