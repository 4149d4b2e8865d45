//! Analysis orchestrator.
//!
//! One call to `VideoAnalyzer::analyze_upload` runs a whole request:
//!
//! 1. validate the upload's extension,
//! 2. stage the payload as `input_<uuid>.mp4` in the video directory,
//! 3. decode frame by frame; each frame is detected, annotated, encoded and
//!    aggregated before the next one is pulled,
//! 4. close source and sink, delete the staged input, compute the report.
//!
//! Any detector or encoder failure aborts the whole request. The staged input
//! is deleted on every exit path; a partially written output is closed and
//! removed when the request aborts.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use uuid::Uuid;

use crate::aggregate::{Aggregator, AnalysisReport, VideoAnalysisResult};
use crate::annotate::annotate;
use crate::detect::{DetectorBackend, VIDEO_CONFIDENCE_THRESHOLD};
use crate::media::MediaBackend;
use crate::sink::FrameSink;

/// Upload extensions accepted for analysis (compared case-insensitively).
pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// URL prefix under which output artifacts are served.
pub const VIDEO_URL_PREFIX: &str = "/videos";

/// Request failure, classified by how the caller should surface it.
#[derive(Debug)]
pub enum AnalysisError {
    /// The request was rejected before any work started.
    Validation(String),
    /// A referenced artifact does not exist.
    NotFound(String),
    /// A container or staging file could not be opened or created.
    Resource(anyhow::Error),
    /// Detection, annotation or encoding failed mid-loop.
    Processing { frame: u64, source: anyhow::Error },
}

impl AnalysisError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "validation_error",
            AnalysisError::NotFound(_) => "not_found",
            AnalysisError::Resource(_) => "resource_error",
            AnalysisError::Processing { .. } => "processing_error",
        }
    }

    /// HTTP status used when the error is returned over the API.
    pub fn http_status(&self) -> u16 {
        match self {
            AnalysisError::Validation(_) => 400,
            AnalysisError::NotFound(_) => 404,
            AnalysisError::Resource(_) => 422,
            AnalysisError::Processing { .. } => 500,
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Validation(msg) => write!(f, "{}", msg),
            AnalysisError::NotFound(msg) => write!(f, "{}", msg),
            AnalysisError::Resource(err) => write!(f, "{:#}", err),
            AnalysisError::Processing { frame, source } => {
                write!(f, "processing failed at frame {}: {:#}", frame, source)
            }
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Resource(err) | AnalysisError::Processing { source: err, .. } => {
                Some(&**err)
            }
            _ => None,
        }
    }
}

/// Reject filenames whose extension is not a supported video container.
pub fn validate_video_filename(filename: &str) -> Result<(), AnalysisError> {
    let supported = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_VIDEO_EXTENSIONS
                .iter()
                .any(|s| ext.eq_ignore_ascii_case(s))
        })
        .unwrap_or(false);
    if supported {
        Ok(())
    } else {
        Err(AnalysisError::Validation(
            "Unsupported video format".to_string(),
        ))
    }
}

/// Runs analyses against a shared detector. Cheap to share across threads.
pub struct VideoAnalyzer {
    detector: Arc<dyn DetectorBackend>,
    media: Arc<dyn MediaBackend>,
    video_dir: PathBuf,
}

impl VideoAnalyzer {
    pub fn new(
        detector: Arc<dyn DetectorBackend>,
        media: Arc<dyn MediaBackend>,
        video_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detector,
            media,
            video_dir: video_dir.into(),
        }
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    pub fn media(&self) -> &Arc<dyn MediaBackend> {
        &self.media
    }

    /// Analyze an uploaded video and return its external report.
    pub fn analyze_upload(
        &self,
        filename: &str,
        payload: &[u8],
    ) -> Result<AnalysisReport, AnalysisError> {
        validate_video_filename(filename)?;
        let staged = StagedInput::write(&self.video_dir, payload)?;
        log::info!(
            "analysis started: upload '{}' ({} bytes) staged as {}",
            filename,
            payload.len(),
            staged.path().display()
        );
        let result = self.analyze_staged(&staged);
        drop(staged);

        let result = result?;
        log::info!(
            "analysis complete: {} frames, {} with helmet, verdict {}",
            result.total_frames,
            result.frames_with_helmet,
            result.verdict.as_str()
        );
        Ok(result.to_report())
    }

    fn analyze_staged(&self, staged: &StagedInput) -> Result<VideoAnalysisResult, AnalysisError> {
        let mut source = self
            .media
            .open_source(staged.path())
            .map_err(AnalysisError::Resource)?;
        let info = source.info().with_fallback_fps();

        let output_name = format!("output_{}.mp4", Uuid::new_v4());
        let output_path = self.video_dir.join(&output_name);
        let mut sink = match self.media.create_sink(&output_path, &info) {
            Ok(sink) => sink,
            Err(err) => {
                // The container may already exist on disk when encoder setup fails.
                remove_if_exists(&output_path);
                return Err(AnalysisError::Resource(err));
            }
        };
        log::debug!(
            "decoding {}x{} @ {:.2} fps into {}",
            info.width,
            info.height,
            info.fps,
            output_path.display()
        );

        let mut aggregator = Aggregator::new();
        for frame in source.by_ref() {
            let index = aggregator.total_frames();
            let step = self
                .detector
                .detect(&frame, VIDEO_CONFIDENCE_THRESHOLD)
                .context("detector failed")
                .and_then(|detections| {
                    let annotated = annotate(frame, &detections);
                    sink.write(&annotated).context("encoder rejected frame")?;
                    Ok(detections)
                });
            match step {
                Ok(detections) => {
                    aggregator.observe(&detections);
                }
                Err(err) => {
                    discard_output(sink.as_mut(), &output_path);
                    return Err(AnalysisError::Processing {
                        frame: index,
                        source: err,
                    });
                }
            }
        }
        log::debug!("decoded {} frames from {}", source.frames_read(), staged.path().display());
        drop(source);

        if let Err(err) = sink.close() {
            discard_output(sink.as_mut(), &output_path);
            return Err(AnalysisError::Processing {
                frame: aggregator.total_frames(),
                source: err.context("finalize output video"),
            });
        }

        log::debug!("wrote {} frames to {}", sink.frames_written(), output_path.display());
        Ok(aggregator.finalize(format!("{}/{}", VIDEO_URL_PREFIX, output_name)))
    }
}

fn discard_output(sink: &mut dyn FrameSink, path: &Path) {
    if let Err(err) = sink.close() {
        log::warn!("failed to close aborted output {}: {:#}", path.display(), err);
    }
    remove_if_exists(path);
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("failed to delete {}: {}", path.display(), err),
    }
}

/// Uploaded payload written to a uniquely named file. Deleted on drop.
struct StagedInput {
    path: PathBuf,
}

impl StagedInput {
    fn write(video_dir: &Path, payload: &[u8]) -> Result<Self, AnalysisError> {
        fs::create_dir_all(video_dir)
            .with_context(|| format!("create video directory {}", video_dir.display()))
            .map_err(AnalysisError::Resource)?;
        let path = video_dir.join(format!("input_{}.mp4", Uuid::new_v4()));
        let staged = Self { path };
        fs::write(&staged.path, payload)
            .with_context(|| format!("stage upload to {}", staged.path.display()))
            .map_err(AnalysisError::Resource)?;
        Ok(staged)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        remove_if_exists(&self.path);
    }
}
