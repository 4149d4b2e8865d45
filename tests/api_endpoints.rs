mod common;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use helmet_watch::api::{ApiConfig, ApiServer};
use helmet_watch::{StubBackend, VideoAnalyzer};

use common::{container, FakeMedia};

const BOUNDARY: &str = "helmet-test-boundary";

struct Response {
    status: u16,
    headers: String,
    body: Vec<u8>,
}

impl Response {
    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

fn send(addr: SocketAddr, head: &str, body: &[u8]) -> Response {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(head.as_bytes()).expect("write head");
    stream.write_all(body).expect("write body");
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read response");

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response headers");
    let headers = String::from_utf8_lossy(&raw[..split]).into_owned();
    let status = headers
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    Response {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

fn get(addr: SocketAddr, path: &str) -> Response {
    send(
        addr,
        &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        &[],
    )
}

fn upload(addr: SocketAddr, filename: &str, payload: &[u8]) -> Response {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let head = format!(
        "POST /predict-video HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
         Content-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    send(addr, &head, &body)
}

fn start(dir: &std::path::Path, media: &FakeMedia) -> helmet_watch::api::ApiHandle {
    let analyzer = Arc::new(VideoAnalyzer::new(
        Arc::new(StubBackend::centered(0.9)),
        Arc::new(media.clone()),
        dir,
    ));
    let cfg = ApiConfig {
        addr: "127.0.0.1:0".to_string(),
        ..ApiConfig::default()
    };
    ApiServer::new(cfg, analyzer).spawn().expect("spawn api")
}

#[test]
fn root_reports_liveness() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    let resp = get(handle.addr, "/");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json()["status"], "API running");
    assert!(resp.headers.contains("Access-Control-Allow-Origin: *"));

    handle.stop().unwrap();
}

#[test]
fn predict_video_returns_report() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    let resp = upload(handle.addr, "site.mp4", &container(3, 32, 24, 25.0));
    assert_eq!(resp.status, 200);
    let report = resp.json();
    assert_eq!(report["total_frames"], 3);
    assert_eq!(report["frames_with_helmet"], 3);
    assert_eq!(report["helmet_presence_ratio"], 1.0);
    assert_eq!(report["avg_confidence"], 0.9);
    assert_eq!(report["verdict"], "HELMET WORN");
    assert_eq!(report["confidence_timeline"].as_array().unwrap().len(), 3);

    let url = report["video_url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/videos/output_") && url.ends_with(".mp4"));

    let video = get(handle.addr, &url);
    assert_eq!(video.status, 200);
    assert!(video.headers.contains("Content-Type: video/mp4"));
    let expected = container(3, 32, 24, 25.0);
    assert!(video
        .headers
        .contains(&format!("Content-Length: {}", expected.len())));
    assert_eq!(video.body, expected);

    handle.stop().unwrap();
}

#[test]
fn unsupported_upload_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    let resp = upload(handle.addr, "clip.txt", &container(3, 32, 24, 25.0));
    assert_eq!(resp.status, 400);
    let body = resp.json();
    assert_eq!(body["error"], "Unsupported video format");
    assert_eq!(body["code"], "validation_error");
    assert!(media.opened.lock().unwrap().is_empty());

    handle.stop().unwrap();
}

#[test]
fn corrupt_upload_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    let resp = upload(handle.addr, "broken.mov", b"corrupt");
    assert_eq!(resp.status, 422);
    assert_eq!(resp.json()["code"], "resource_error");
    assert!(common::dir_entries(dir.path()).is_empty());

    handle.stop().unwrap();
}

#[test]
fn stream_of_missing_video_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    let resp = get(handle.addr, "/stream-video?filename=output_missing.mp4");
    assert_eq!(resp.status, 404);
    assert_eq!(resp.json()["code"], "not_found");

    let escape = get(handle.addr, "/stream-video?filename=..%2Fsecret.mp4");
    assert_eq!(escape.status, 404);
    assert!(media.opened.lock().unwrap().is_empty());

    handle.stop().unwrap();
}

#[test]
fn stream_of_produced_video_is_mjpeg() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    let report = upload(handle.addr, "site.mp4", &container(2, 32, 24, 25.0)).json();
    let url = report["video_url"].as_str().unwrap();
    let name = url.trim_start_matches("/videos/");

    let resp = get(handle.addr, &format!("/stream-video?filename={name}"));
    assert_eq!(resp.status, 200);
    assert!(resp
        .headers
        .contains("Content-Type: multipart/x-mixed-replace; boundary=frame"));
    let parts = resp
        .body
        .windows(b"--frame\r\n".len())
        .filter(|w| *w == b"--frame\r\n")
        .count();
    assert_eq!(parts, 2);
    assert!(resp.body.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));

    handle.stop().unwrap();
}

#[test]
fn unknown_routes_and_methods() {
    let dir = tempfile::tempdir().unwrap();
    let media = FakeMedia::new();
    let handle = start(dir.path(), &media);

    assert_eq!(get(handle.addr, "/nope").status, 404);
    assert_eq!(get(handle.addr, "/predict-video").status, 405);
    assert_eq!(get(handle.addr, "/stream-video").status, 400);

    let preflight = send(
        handle.addr,
        "OPTIONS /predict-video HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        &[],
    );
    assert_eq!(preflight.status, 204);
    assert!(preflight
        .headers
        .contains("Access-Control-Allow-Methods: GET, POST, OPTIONS"));

    handle.stop().unwrap();
}
