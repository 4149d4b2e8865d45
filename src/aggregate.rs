//! Whole-video statistics and the compliance verdict.
//!
//! Every decoded frame contributes exactly one entry to the confidence
//! timeline: its highest surviving detection confidence, or `0.0` when it had
//! none. The average confidence is taken over that full timeline, so frames
//! without a helmet pull the average down.

use serde::{Serialize, Serializer};

use crate::detect::DetectionBox;

/// Minimum fraction of frames with a detection for a `Worn` verdict (inclusive).
pub const PRESENCE_THRESHOLD: f64 = 0.4;

/// Minimum average timeline confidence for a `Worn` verdict (inclusive).
pub const AVG_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// What one frame contributed to the aggregate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameObservation {
    pub has_detection: bool,
    pub max_confidence: f64,
}

impl FrameObservation {
    pub fn from_detections(detections: &[DetectionBox]) -> Self {
        let max_confidence = detections
            .iter()
            .map(|d| f64::from(d.confidence))
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))));
        Self {
            has_detection: max_confidence.is_some(),
            max_confidence: max_confidence.unwrap_or(0.0),
        }
    }
}

/// Final binary classification for a whole video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Worn,
    NotWorn,
}

impl Verdict {
    /// `Worn` iff both thresholds are met; both comparisons are inclusive.
    pub fn from_stats(presence_ratio: f64, avg_confidence: f64) -> Self {
        if presence_ratio >= PRESENCE_THRESHOLD && avg_confidence >= AVG_CONFIDENCE_THRESHOLD {
            Verdict::Worn
        } else {
            Verdict::NotWorn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Worn => "HELMET WORN",
            Verdict::NotWorn => "NOT WORN",
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Accumulates per-frame observations in decode order.
#[derive(Debug, Default)]
pub struct Aggregator {
    total_frames: u64,
    frames_with_helmet: u64,
    confidence_timeline: Vec<f64>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame's post-threshold detections.
    pub fn observe(&mut self, detections: &[DetectionBox]) -> FrameObservation {
        let observation = FrameObservation::from_detections(detections);
        self.total_frames += 1;
        if observation.has_detection {
            self.frames_with_helmet += 1;
        }
        self.confidence_timeline.push(observation.max_confidence);
        observation
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Compute the whole-video statistics.
    pub fn finalize(self, output_video_ref: String) -> VideoAnalysisResult {
        let presence_ratio = if self.total_frames == 0 {
            0.0
        } else {
            self.frames_with_helmet as f64 / self.total_frames as f64
        };
        let avg_confidence = if self.confidence_timeline.is_empty() {
            0.0
        } else {
            self.confidence_timeline.iter().sum::<f64>() / self.confidence_timeline.len() as f64
        };

        VideoAnalysisResult {
            output_video_ref,
            total_frames: self.total_frames,
            frames_with_helmet: self.frames_with_helmet,
            presence_ratio,
            avg_confidence,
            verdict: Verdict::from_stats(presence_ratio, avg_confidence),
            confidence_timeline: self.confidence_timeline,
        }
    }
}

/// Full-precision outcome of one analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoAnalysisResult {
    pub output_video_ref: String,
    pub total_frames: u64,
    pub frames_with_helmet: u64,
    pub presence_ratio: f64,
    pub avg_confidence: f64,
    pub verdict: Verdict,
    pub confidence_timeline: Vec<f64>,
}

impl VideoAnalysisResult {
    /// External representation, with ratios rounded to three decimals.
    pub fn to_report(&self) -> AnalysisReport {
        AnalysisReport {
            video_url: self.output_video_ref.clone(),
            total_frames: self.total_frames,
            frames_with_helmet: self.frames_with_helmet,
            helmet_presence_ratio: round3(self.presence_ratio),
            avg_confidence: round3(self.avg_confidence),
            verdict: self.verdict,
            confidence_timeline: self.confidence_timeline.clone(),
        }
    }
}

/// Response body of a successful analysis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub video_url: String,
    pub total_frames: u64,
    pub frames_with_helmet: u64,
    pub helmet_presence_ratio: f64,
    pub avg_confidence: f64,
    pub verdict: Verdict,
    pub confidence_timeline: Vec<f64>,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
