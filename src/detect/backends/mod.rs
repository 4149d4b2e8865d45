pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{DetectorKind, DetectorSettings};
use crate::detect::backend::{DetectionCapability, DetectorBackend};

/// Confidence reported by the stub backend when built from configuration.
const STUB_CONFIDENCE: f32 = 0.9;

/// Construct the configured detector once, for sharing across requests.
pub fn build_backend(settings: &DetectorSettings) -> Result<Arc<dyn DetectorBackend>> {
    let backend: Arc<dyn DetectorBackend> = match settings.kind {
        DetectorKind::Stub => Arc::new(StubBackend::centered(STUB_CONFIDENCE)),
        DetectorKind::Tract => build_tract(settings)?,
    };
    if !backend.supports(DetectionCapability::HelmetBoxes) {
        return Err(anyhow::anyhow!(
            "detector backend '{}' cannot report helmet boxes",
            backend.name()
        ));
    }
    backend.warm_up()?;
    log::info!("detector backend '{}' ready", backend.name());
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Arc<dyn DetectorBackend>> {
    let backend = TractBackend::new(&settings.model_path, settings.input_size)?
        .with_iou_threshold(settings.iou_threshold)
        .with_max_detections(settings.max_detections);
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Arc<dyn DetectorBackend>> {
    Err(anyhow::anyhow!(
        "detector backend 'tract' requires the backend-tract feature"
    ))
}
