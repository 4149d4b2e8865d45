//! Helmet Watch
//!
//! Offline helmet-compliance analysis of uploaded videos.
//!
//! # Pipeline
//!
//! An upload is staged to disk, decoded frame by frame, run through a helmet
//! detector, annotated with boxes and confidence labels, re-encoded into an
//! output video and reduced to whole-video statistics with a binary verdict.
//! Produced videos can be re-streamed as MJPEG for live viewing.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames and container metadata
//! - `ingest`: Frame sources (local video files)
//! - `sink`: Frame sinks (MPEG-4 output files)
//! - `media`: Source/sink factories used by the pipeline
//! - `detect`: Detector backends and detection boxes
//! - `annotate`: Box and label overlay
//! - `aggregate`: Timeline, ratios and verdict
//! - `analysis`: Request orchestration and error classification
//! - `stream`: MJPEG re-streaming
//! - `api`: HTTP surface of `helmetd`
//! - `config`: `helmetd` configuration

pub mod aggregate;
pub mod analysis;
pub mod annotate;
pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod media;
pub mod sink;
pub mod stream;

pub use aggregate::{Aggregator, AnalysisReport, FrameObservation, Verdict, VideoAnalysisResult};
pub use analysis::{validate_video_filename, AnalysisError, VideoAnalyzer};
pub use annotate::annotate;
pub use config::{DetectorKind, DetectorSettings, HelmetdConfig};
pub use detect::{build_backend, DetectionBox, DetectorBackend, StubBackend};
pub use frame::{Frame, VideoInfo};
pub use ingest::{FileSource, FrameSource};
pub use media::{FileMedia, MediaBackend};
pub use sink::{FileSink, FrameSink};
pub use stream::LiveStream;
