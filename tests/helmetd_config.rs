use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use helmet_watch::config::{DetectorKind, HelmetdConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HELMET_CONFIG",
        "HELMET_API_ADDR",
        "HELMET_VIDEO_DIR",
        "HELMET_MODEL_PATH",
        "HELMET_DETECTOR_BACKEND",
        "HELMET_MAX_UPLOAD_BYTES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = HelmetdConfig::load().expect("load defaults");
    assert_eq!(cfg.api_addr, "127.0.0.1:8000");
    assert_eq!(cfg.video_dir, PathBuf::from("outputs/videos"));
    assert_eq!(cfg.detector.kind, DetectorKind::Tract);
    assert_eq!(
        cfg.detector.model_path,
        PathBuf::from("helmet_detector_best.onnx")
    );
    assert_eq!(cfg.max_upload_bytes, 512 * 1024 * 1024);
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "video_dir": "/srv/helmet/videos",
        "api": { "addr": "0.0.0.0:9000", "max_upload_bytes": 1048576 },
        "detector": {
            "backend": "stub",
            "model_path": "/models/helmet.onnx",
            "input_size": 320,
            "iou_threshold": 0.5,
            "max_detections": 50
        },
        "stream": { "jpeg_quality": 70 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("HELMET_CONFIG", file.path());
    std::env::set_var("HELMET_API_ADDR", "127.0.0.1:9100");
    std::env::set_var("HELMET_MODEL_PATH", "/models/override.onnx");

    let cfg = HelmetdConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.max_upload_bytes, 1_048_576);
    assert_eq!(cfg.video_dir, PathBuf::from("/srv/helmet/videos"));
    assert_eq!(cfg.detector.kind, DetectorKind::Stub);
    assert_eq!(cfg.detector.model_path, PathBuf::from("/models/override.onnx"));
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.detector.iou_threshold, 0.5);
    assert_eq!(cfg.detector.max_detections, 50);
    assert_eq!(cfg.jpeg_quality, 70);
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
video_dir = "videos"

[api]
addr = "0.0.0.0:8080"

[detector]
backend = "tract"
input_size = 416
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("HELMET_CONFIG", file.path());
    std::env::set_var("HELMET_DETECTOR_BACKEND", "stub");
    std::env::set_var("HELMET_VIDEO_DIR", "/tmp/helmet-out");

    let cfg = HelmetdConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.api_addr, "0.0.0.0:8080");
    assert_eq!(cfg.detector.kind, DetectorKind::Stub);
    assert_eq!(cfg.detector.input_size, 416);
    assert_eq!(cfg.video_dir, PathBuf::from("/tmp/helmet-out"));
}

#[test]
fn rejects_unknown_fields_and_bad_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "api": { "addr": "127.0.0.1:1", "token_path": "x" } }"#)
        .expect("write config");
    std::env::set_var("HELMET_CONFIG", file.path());
    assert!(HelmetdConfig::load().is_err());
    clear_env();

    std::env::set_var("HELMET_MAX_UPLOAD_BYTES", "lots");
    assert!(HelmetdConfig::load().is_err());
    clear_env();

    std::env::set_var("HELMET_DETECTOR_BACKEND", "opencv");
    assert!(HelmetdConfig::load().is_err());
    clear_env();

    std::env::set_var("HELMET_CONFIG", "/nonexistent/helmetd.json");
    assert!(HelmetdConfig::load().is_err());
    clear_env();
}
