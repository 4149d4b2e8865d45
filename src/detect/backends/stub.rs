use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{filter_by_confidence, DetectionBox};
use crate::frame::Frame;

/// Stub backend for smoke runs and tests. Returns the same detections for every frame.
pub struct StubBackend {
    mode: StubMode,
}

enum StubMode {
    Fixed(Vec<DetectionBox>),
    Centered(f32),
}

impl StubBackend {
    /// Always report `boxes` (before threshold filtering).
    pub fn new(boxes: Vec<DetectionBox>) -> Self {
        Self {
            mode: StubMode::Fixed(boxes),
        }
    }

    /// Never report anything.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Report one box covering the middle half of each frame.
    pub fn centered(confidence: f32) -> Self {
        Self {
            mode: StubMode::Centered(confidence),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::HelmetBoxes)
    }

    fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<DetectionBox>> {
        let boxes = match &self.mode {
            StubMode::Fixed(boxes) => boxes.clone(),
            StubMode::Centered(confidence) => {
                let w = frame.width() as f32;
                let h = frame.height() as f32;
                vec![DetectionBox::new(
                    w * 0.25,
                    h * 0.25,
                    w * 0.75,
                    h * 0.75,
                    *confidence,
                )]
            }
        };
        Ok(filter_by_confidence(boxes, threshold))
    }
}
