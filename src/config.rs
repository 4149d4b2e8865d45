use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::stream::DEFAULT_JPEG_QUALITY;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_VIDEO_DIR: &str = "outputs/videos";
const DEFAULT_MODEL_PATH: &str = "helmet_detector_best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
const DEFAULT_MAX_DETECTIONS: usize = 300;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HelmetdConfigFile {
    video_dir: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
}

/// Which detector implementation to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    Tract,
    Stub,
}

impl DetectorKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(DetectorKind::Tract),
            "stub" => Ok(DetectorKind::Stub),
            other => Err(anyhow!(
                "detector.backend must be 'tract' or 'stub', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HelmetdConfig {
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub video_dir: PathBuf,
    pub detector: DetectorSettings,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Tract,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl HelmetdConfig {
    /// Load from `HELMET_CONFIG` (JSON, or TOML by extension), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HELMET_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HelmetdConfigFile) -> Result<Self> {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let kind = match detector.backend.as_deref() {
            Some(name) => DetectorKind::parse(name)?,
            None => defaults.kind,
        };
        Ok(Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            video_dir: file
                .video_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEO_DIR)),
            detector: DetectorSettings {
                kind,
                model_path: detector.model_path.unwrap_or(defaults.model_path),
                input_size: detector.input_size.unwrap_or(defaults.input_size),
                iou_threshold: detector.iou_threshold.unwrap_or(defaults.iou_threshold),
                max_detections: detector.max_detections.unwrap_or(defaults.max_detections),
            },
            jpeg_quality: file
                .stream
                .and_then(|stream| stream.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("HELMET_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("HELMET_VIDEO_DIR") {
            if !dir.trim().is_empty() {
                self.video_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("HELMET_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("HELMET_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.kind = DetectorKind::parse(&backend)?;
            }
        }
        if let Ok(max) = std::env::var("HELMET_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("HELMET_MAX_UPLOAD_BYTES must be an integer byte count"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("api.max_upload_bytes must be greater than zero"));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(anyhow!(
                "detector.input_size must be a positive multiple of 32"
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(anyhow!("detector.iou_threshold must be within 0..=1"));
        }
        if self.detector.max_detections == 0 {
            return Err(anyhow!("detector.max_detections must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("stream.jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<HelmetdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
