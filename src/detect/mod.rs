mod backend;
pub mod backends;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{build_backend, StubBackend};
pub use result::{filter_by_confidence, non_max_suppression, DetectionBox};

/// Confidence threshold used for every frame of a video analysis.
pub const VIDEO_CONFIDENCE_THRESHOLD: f32 = 0.4;
