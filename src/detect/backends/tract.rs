#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{non_max_suppression, DetectionBox};
use crate::frame::Frame;

type Plan = TypedRunnableModel<TypedModel>;

/// Tract-based backend for YOLO-family ONNX exports.
///
/// The model takes a `[1, 3, S, S]` RGB tensor scaled to 0..1 and produces
/// `[1, 4 + classes, candidates]` rows of `cx, cy, w, h, class scores...` in
/// input pixel space. Every class counts as a helmet detection.
pub struct TractBackend {
    model: Plan,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: 0.7,
            max_detections: 300,
        })
    }

    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame, threshold: f32) -> Result<Vec<DetectionBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let rows = shape[1];
        let candidates = shape[2];

        let sx = frame.width() as f32 / self.input_size as f32;
        let sy = frame.height() as f32 / self.input_size as f32;

        let mut boxes = Vec::new();
        for i in 0..candidates {
            let score = (4..rows)
                .map(|r| view[[0, r, i]])
                .fold(f32::NEG_INFINITY, f32::max);
            if !score.is_finite() || score < threshold {
                continue;
            }
            let cx = view[[0, 0, i]];
            let cy = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            boxes.push(DetectionBox::new(
                (cx - w / 2.0) * sx,
                (cy - h / 2.0) * sy,
                (cx + w / 2.0) * sx,
                (cy + h / 2.0) * sy,
                score.min(1.0),
            ));
        }

        Ok(non_max_suppression(
            boxes,
            self.iou_threshold,
            self.max_detections,
        ))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::HelmetBoxes)
    }

    fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<DetectionBox>> {
        if frame.is_empty() {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, threshold)
    }

    fn warm_up(&self) -> Result<()> {
        let side = self.input_size;
        let blank = Frame::filled(side, side, [0, 0, 0])?;
        self.detect(&blank, 1.0).map(|_| ())
    }
}
