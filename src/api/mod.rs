//! HTTP/1.1 surface of `helmetd`.
//!
//! Routes:
//! - `GET /` liveness.
//! - `POST /predict-video` multipart upload (`file` field), returns the analysis report.
//! - `GET /stream-video?filename=<name>` MJPEG re-stream of a produced video.
//! - `GET /videos/<name>` produced videos as static files.
//!
//! Each accepted connection is served on its own thread and closed after one
//! response.

pub mod multipart;

use crate::analysis::{AnalysisError, VideoAnalyzer, VIDEO_URL_PREFIX};
use crate::stream::{LiveStream, DEFAULT_JPEG_QUALITY, MJPEG_CONTENT_TYPE};
use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use url::form_urlencoded;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
    pub jpeg_quality: u8,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 512 * 1024 * 1024,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

struct ApiState {
    cfg: ApiConfig,
    analyzer: Arc<VideoAnalyzer>,
}

pub struct ApiServer {
    cfg: ApiConfig,
    analyzer: Arc<VideoAnalyzer>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, analyzer: Arc<VideoAnalyzer>) -> Self {
        Self { cfg, analyzer }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = Arc::new(ApiState {
            cfg: self.cfg,
            analyzer: self.analyzer,
        });
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, state, shutdown_thread) {
                log::error!("helmet api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, state: Arc<ApiState>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let state = state.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &state) {
                        log::warn!("request from {} failed: {:#}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &ApiState) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let request = match read_request(&mut stream, state.cfg.max_upload_bytes)? {
        RequestRead::Complete(request) => request,
        RequestRead::TooLarge => {
            return write_error(&mut stream, 413, "payload_too_large", "Upload too large");
        }
    };
    log::debug!("{} {}", request.method, request.path);

    if request.method == "OPTIONS" {
        return write_response(&mut stream, 204, None, &[]);
    }

    match request.path.as_str() {
        "/" => match request.method.as_str() {
            "GET" => write_json(&mut stream, 200, &json!({ "status": "API running" })),
            _ => write_method_not_allowed(&mut stream),
        },
        "/predict-video" => match request.method.as_str() {
            "POST" => handle_predict_video(&mut stream, state, &request),
            _ => write_method_not_allowed(&mut stream),
        },
        "/stream-video" => match request.method.as_str() {
            "GET" => handle_stream_video(&mut stream, state, &request),
            _ => write_method_not_allowed(&mut stream),
        },
        path => match path.strip_prefix(VIDEO_URL_PREFIX).and_then(|p| p.strip_prefix('/')) {
            Some(name) if request.method == "GET" => handle_static_video(&mut stream, state, name),
            Some(_) => write_method_not_allowed(&mut stream),
            None => write_error(&mut stream, 404, "not_found", "Not found"),
        },
    }
}

fn handle_predict_video(stream: &mut TcpStream, state: &ApiState, request: &HttpRequest) -> Result<()> {
    let (filename, payload) = match extract_upload(request) {
        Ok(upload) => upload,
        Err(err) => return write_analysis_error(stream, &err),
    };
    match state.analyzer.analyze_upload(&filename, &payload) {
        Ok(report) => write_json(stream, 200, &serde_json::to_value(&report)?),
        Err(err) => {
            if !matches!(err, AnalysisError::Validation(_)) {
                log::warn!("analysis of '{}' failed: {}", filename, err);
            }
            write_analysis_error(stream, &err)
        }
    }
}

/// Pull the `file` part out of a multipart request as (filename, bytes).
fn extract_upload(request: &HttpRequest) -> Result<(String, Vec<u8>), AnalysisError> {
    let content_type = request.header("content-type").unwrap_or_default();
    let boundary = multipart::boundary_from_content_type(content_type).ok_or_else(|| {
        AnalysisError::Validation("Expected multipart/form-data upload".to_string())
    })?;
    let parts = multipart::parse_multipart(&request.body, &boundary)
        .map_err(|err| AnalysisError::Validation(format!("Malformed upload: {err}")))?;
    let part = parts
        .into_iter()
        .find(|p| p.name == "file")
        .ok_or_else(|| AnalysisError::Validation("Missing 'file' field".to_string()))?;
    Ok((part.filename.unwrap_or_default(), part.data))
}

fn handle_stream_video(stream: &mut TcpStream, state: &ApiState, request: &HttpRequest) -> Result<()> {
    let Some(filename) = request.query_param("filename") else {
        return write_error(stream, 400, "validation_error", "Missing 'filename' parameter");
    };
    let Some(path) = artifact_path(state, &filename) else {
        return write_error(stream, 404, "not_found", "Video not found");
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {MJPEG_CONTENT_TYPE}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;

    let live = LiveStream::open(state.analyzer.media().as_ref(), &path, state.cfg.jpeg_quality);
    let mut sent = 0u64;
    for part in live {
        if let Err(err) = stream.write_all(&part) {
            log::debug!("live stream client went away after {} frames: {}", sent, err);
            return Ok(());
        }
        sent += 1;
    }
    stream.flush()?;
    log::debug!("live stream of {} finished after {} frames", filename, sent);
    Ok(())
}

fn handle_static_video(stream: &mut TcpStream, state: &ApiState, name: &str) -> Result<()> {
    let Some(path) = artifact_path(state, name) else {
        return write_error(stream, 404, "not_found", "Video not found");
    };
    let mut file = std::fs::File::open(&path)?;
    let len = file.metadata()?.len();
    write_head(stream, 200, Some("video/mp4"), len)?;
    std::io::copy(&mut file, stream)?;
    stream.flush()?;
    Ok(())
}

/// Resolve an artifact name inside the video directory. `None` when the name
/// could escape the directory or the file does not exist.
fn artifact_path(state: &ApiState, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return None;
    }
    let path = state.analyzer.video_dir().join(name);
    path.is_file().then_some(path)
}

enum RequestRead {
    Complete(HttpRequest),
    TooLarge,
}

fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<RequestRead> {
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    if content_length > max_body {
        return Ok(RequestRead::TooLarge);
    }

    let mut body = data.split_off(header_end + 4);
    body.truncate(content_length);
    while body.len() < content_length {
        let want = (content_length - body.len()).min(buf.len());
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (raw_path.to_string(), None),
    };
    Ok(RequestRead::Complete(HttpRequest {
        method: method.to_string(),
        path,
        query,
        headers,
        body,
    }))
}

fn write_json(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, Some("application/json"), &payload)
}

fn write_error(stream: &mut TcpStream, status: u16, code: &str, message: &str) -> Result<()> {
    write_json(stream, status, &json!({ "error": message, "code": code }))
}

fn write_analysis_error(stream: &mut TcpStream, err: &AnalysisError) -> Result<()> {
    write_error(stream, err.http_status(), err.code(), &err.to_string())
}

fn write_method_not_allowed(stream: &mut TcpStream) -> Result<()> {
    write_error(stream, 405, "method_not_allowed", "Method not allowed")
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<()> {
    write_head(stream, status, content_type, body.len() as u64)?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

fn write_head(
    stream: &mut TcpStream,
    status: u16,
    content_type: Option<&str>,
    content_length: u64,
) -> Result<()> {
    let status_line = status_line(status);
    let mut header = format!(
        "{status_line}\r\nContent-Length: {content_length}\r\nCache-Control: no-store\r\nConnection: close\r\n\
         Access-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n"
    );
    if let Some(content_type) = content_type {
        header.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: Option<String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn query_param(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}
