//! Test doubles shared by the integration tests.
//!
//! `FakeMedia` stands in for real containers with a one-line text header,
//! `FRAMES <n> <w>x<h>@<fps>`. Frame `i` is filled with `[i, 0, 0]` so a
//! detector can tell frames apart by their first pixel.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use helmet_watch::detect::{filter_by_confidence, DetectionCapability};
use helmet_watch::{
    DetectionBox, DetectorBackend, Frame, FrameSink, FrameSource, MediaBackend, VideoInfo,
};

pub fn container(frames: u64, width: u32, height: u32, fps: f64) -> Vec<u8> {
    format!("FRAMES {frames} {width}x{height}@{fps}").into_bytes()
}

fn parse_container(raw: &str) -> Option<(u64, VideoInfo)> {
    let rest = raw.trim().strip_prefix("FRAMES ")?;
    let (count, geometry) = rest.split_once(' ')?;
    let (size, fps) = geometry.split_once('@')?;
    let (width, height) = size.split_once('x')?;
    Some((
        count.parse().ok()?,
        VideoInfo {
            width: width.parse().ok()?,
            height: height.parse().ok()?,
            fps: fps.parse().ok()?,
        },
    ))
}

#[derive(Debug, Default)]
pub struct SinkRecord {
    pub path: PathBuf,
    pub info: Option<VideoInfo>,
    pub frames: Vec<Frame>,
    pub closes: u32,
}

#[derive(Clone, Default)]
pub struct FakeMedia {
    pub sinks: Arc<Mutex<Vec<SinkRecord>>>,
    pub opened: Arc<Mutex<Vec<PathBuf>>>,
    /// Create the output file, then fail as if the encoder refused to open.
    pub fail_sink_setup: bool,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_sink_setup() -> Self {
        Self {
            fail_sink_setup: true,
            ..Self::default()
        }
    }

    pub fn sink(&self, index: usize) -> SinkSnapshot {
        let sinks = self.sinks.lock().unwrap();
        let record = &sinks[index];
        SinkSnapshot {
            path: record.path.clone(),
            info: record.info,
            frames: record.frames.clone(),
            closes: record.closes,
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

pub struct SinkSnapshot {
    pub path: PathBuf,
    pub info: Option<VideoInfo>,
    pub frames: Vec<Frame>,
    pub closes: u32,
}

impl MediaBackend for FakeMedia {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let raw = std::fs::read_to_string(path)?;
        let (count, info) =
            parse_container(&raw).ok_or_else(|| anyhow!("cannot open {}", path.display()))?;
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(FakeSource {
            info,
            count,
            next: 0,
        }))
    }

    fn create_sink(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn FrameSink>> {
        std::fs::write(path, b"PARTIAL")?;
        if self.fail_sink_setup {
            return Err(anyhow!("open MPEG-4 encoder: timebase not supported"));
        }
        let mut sinks = self.sinks.lock().unwrap();
        sinks.push(SinkRecord {
            path: path.to_path_buf(),
            info: Some(*info),
            ..SinkRecord::default()
        });
        Ok(Box::new(FakeSink {
            index: sinks.len() - 1,
            sinks: self.sinks.clone(),
            info: *info,
            closed: false,
        }))
    }
}

struct FakeSource {
    info: VideoInfo,
    count: u64,
    next: u64,
}

impl Iterator for FakeSource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.next >= self.count {
            return None;
        }
        let value = (self.next % 256) as u8;
        self.next += 1;
        Frame::filled(self.info.width, self.info.height, [value, 0, 0]).ok()
    }
}

impl FrameSource for FakeSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn frames_read(&self) -> u64 {
        self.next
    }
}

struct FakeSink {
    index: usize,
    sinks: Arc<Mutex<Vec<SinkRecord>>>,
    info: VideoInfo,
    closed: bool,
}

impl FrameSink for FakeSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("sink closed"));
        }
        self.sinks.lock().unwrap()[self.index]
            .frames
            .push(frame.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut sinks = self.sinks.lock().unwrap();
        let record = &mut sinks[self.index];
        record.closes += 1;
        std::fs::write(
            &record.path,
            container(
                record.frames.len() as u64,
                self.info.width,
                self.info.height,
                self.info.fps,
            ),
        )?;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.sinks.lock().unwrap()[self.index].frames.len() as u64
    }
}

/// Reports the scripted confidences for the frame whose first pixel is the key.
pub struct ScriptedDetector {
    script: HashMap<u8, Vec<f32>>,
}

impl ScriptedDetector {
    pub fn new(script: &[(u8, &[f32])]) -> Self {
        Self {
            script: script
                .iter()
                .map(|(frame, confidences)| (*frame, confidences.to_vec()))
                .collect(),
        }
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::HelmetBoxes)
    }

    fn detect(&self, frame: &Frame, threshold: f32) -> Result<Vec<DetectionBox>> {
        let key = frame.pixels().first().copied().unwrap_or_default();
        let boxes = self
            .script
            .get(&key)
            .map(|confidences| {
                confidences
                    .iter()
                    .map(|&c| DetectionBox::new(2.0, 2.0, 12.0, 12.0, c))
                    .collect()
            })
            .unwrap_or_default();
        Ok(filter_by_confidence(boxes, threshold))
    }
}

/// Fails on the frame whose first pixel equals `fail_at`.
pub struct FailingDetector {
    pub fail_at: u8,
}

impl DetectorBackend for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn supports(&self, _capability: DetectionCapability) -> bool {
        true
    }

    fn detect(&self, frame: &Frame, _threshold: f32) -> Result<Vec<DetectionBox>> {
        if frame.pixels().first() == Some(&self.fail_at) {
            return Err(anyhow!("inference failed"));
        }
        Ok(Vec::new())
    }
}

pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
