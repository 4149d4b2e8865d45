use serde::{Deserialize, Serialize};

/// One detected box in pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl DetectionBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &DetectionBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Keep boxes whose confidence is at least `threshold` (inclusive).
pub fn filter_by_confidence(boxes: Vec<DetectionBox>, threshold: f32) -> Vec<DetectionBox> {
    boxes
        .into_iter()
        .filter(|b| b.confidence >= threshold)
        .collect()
}

/// Class-agnostic greedy NMS. Output is sorted by descending confidence and
/// holds at most `max_detections` boxes.
pub fn non_max_suppression(
    mut boxes: Vec<DetectionBox>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<DetectionBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DetectionBox> = Vec::new();
    for candidate in boxes {
        if kept.len() >= max_detections {
            break;
        }
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
