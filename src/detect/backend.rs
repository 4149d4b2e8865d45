use anyhow::Result;

use crate::detect::result::DetectionBox;
use crate::frame::Frame;

/// Detection capabilities supported by backends.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Bounding boxes around helmets.
    HelmetBoxes,
}

/// Detector backend trait.
///
/// A backend is loaded once at startup and shared by reference across every
/// analysis request and worker thread, so `detect` takes `&self` and must not
/// mutate backend state. Any error is fatal for the frame's request; backends
/// never return partial detections.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame, keeping only boxes with `confidence >= threshold`.
    fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<DetectionBox>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
