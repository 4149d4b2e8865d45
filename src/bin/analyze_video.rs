//! analyze_video - run one helmet analysis from the command line and print the report

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use helmet_watch::{build_backend, DetectorKind, DetectorSettings, FileMedia, VideoAnalyzer};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file to analyze (.mp4, .avi or .mov).
    input: PathBuf,
    /// Directory receiving the annotated output video.
    #[arg(long, env = "HELMET_VIDEO_DIR", default_value = "outputs/videos")]
    video_dir: PathBuf,
    /// Detector backend (tract|stub).
    #[arg(long, env = "HELMET_DETECTOR_BACKEND", default_value = "tract")]
    backend: String,
    /// ONNX model used by the tract backend.
    #[arg(long, env = "HELMET_MODEL_PATH", default_value = "helmet_detector_best.onnx")]
    model: PathBuf,
    /// Square model input size in pixels.
    #[arg(long, default_value_t = 640)]
    input_size: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let filename = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("input path has no usable file name"))?
        .to_string();
    let payload = std::fs::read(&args.input)
        .with_context(|| format!("read {}", args.input.display()))?;

    let settings = DetectorSettings {
        kind: DetectorKind::parse(&args.backend)?,
        model_path: args.model,
        input_size: args.input_size,
        ..DetectorSettings::default()
    };
    let detector = build_backend(&settings)?;
    let analyzer = VideoAnalyzer::new(detector, Arc::new(FileMedia), args.video_dir);

    let report = analyzer
        .analyze_upload(&filename, &payload)
        .map_err(|err| anyhow!("{} ({})", err, err.code()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
