//! Perception record model and loader.
//!
//! The record is produced by the offline export pipeline as a single JSON
//! document: a `frames` object keyed by frame identifier plus a `metadata`
//! block. Keys that are not integers are dropped without parsing their
//! values; the remaining keys are kept exactly as written.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_FPS: f64 = 30.0;
pub const DEFAULT_IMAGE_WIDTH: u32 = 1280;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 720;

/// Fatal problems while reading a perception record. None of these leave a
/// partially loaded record behind.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading perception record {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("perception record is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("perception record root must be a JSON object")]
    NotAnObject,
    #[error("perception record has no `frames` object")]
    MissingFrames,
    #[error("frame {key:?} is malformed: {source}")]
    InvalidFrame {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid record metadata: {0}")]
    InvalidMetadata(String),
}

/// Axis-aligned detection bounds in normalized image space.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// One detected vehicle. All geometry is normalized to [0, 1] image space.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VehicleDetection {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl VehicleDetection {
    pub fn new(class_id: u32, center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self {
            class_id,
            center_x,
            center_y,
            width,
            height,
            bbox: None,
        }
    }

    /// Exported bounds when present, otherwise derived from center and size.
    pub fn bounds(&self) -> BoundingBox {
        self.bbox.unwrap_or(BoundingBox {
            x1: self.center_x - self.width / 2.0,
            y1: self.center_y - self.height / 2.0,
            x2: self.center_x + self.width / 2.0,
            y2: self.center_y + self.height / 2.0,
        })
    }
}

/// Pixel-space point as written by the exporter (`[x, y]`).
pub type PixelPoint = [f64; 2];

/// Everything recorded for one discrete frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrameSample {
    #[serde(default)]
    pub vehicles: Vec<VehicleDetection>,
    #[serde(default)]
    pub lane_lines: Vec<Vec<PixelPoint>>,
    #[serde(default)]
    pub drivable_area: Vec<PixelPoint>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordMetadata {
    pub fps: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub total_frames: usize,
}

impl RecordMetadata {
    pub fn new(fps: f64, image_width: u32, image_height: u32, total_frames: usize) -> Self {
        Self {
            fps,
            image_width,
            image_height,
            total_frames,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    total_frames: Option<u64>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
}

/// Immutable, fully loaded perception record.
#[derive(Debug, Clone)]
pub struct PerceptionRecord {
    metadata: RecordMetadata,
    frames: BTreeMap<String, FrameSample>,
}

impl PerceptionRecord {
    pub fn new(metadata: RecordMetadata, frames: BTreeMap<String, FrameSample>) -> Self {
        Self { metadata, frames }
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_slice(&data)?;
        Self::from_value(value)
    }

    pub fn from_json_str(data: &str) -> Result<Self, LoadError> {
        let value: Value = serde_json::from_str(data)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, LoadError> {
        let Value::Object(mut root) = value else {
            return Err(LoadError::NotAnObject);
        };

        let frames_value = match root.remove("frames") {
            Some(Value::Object(map)) => map,
            _ => return Err(LoadError::MissingFrames),
        };

        let mut frames = BTreeMap::new();
        for (key, raw) in frames_value {
            if key.parse::<i64>().is_err() {
                log::debug!("discarding non-integer frame key {key:?}");
                continue;
            }
            let sample: FrameSample = serde_json::from_value(raw).map_err(|source| {
                LoadError::InvalidFrame {
                    key: key.clone(),
                    source,
                }
            })?;
            frames.insert(key, sample);
        }

        let raw_metadata = match root.remove("metadata") {
            Some(Value::Null) | None => RawMetadata::default(),
            Some(node) => serde_json::from_value(node)
                .map_err(|err| LoadError::InvalidMetadata(err.to_string()))?,
        };
        let metadata = resolve_metadata(raw_metadata, frames.len())?;

        log::info!(
            "loaded perception record: {} frame entries, {:.1} fps, {}x{} source images",
            frames.len(),
            metadata.fps,
            metadata.image_width,
            metadata.image_height
        );

        Ok(Self { metadata, frames })
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    /// Keys of the `frames` object as written, e.g. `"07"` stays `"07"`.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }

    pub fn frame(&self, key: &str) -> Option<&FrameSample> {
        self.frames.get(key)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Fixed playback length derived from `total_frames / fps`.
    pub fn total_duration(&self) -> f64 {
        self.metadata.total_frames as f64 / self.metadata.fps
    }

    /// Recorded timestamp, or `frame_id / fps` when the exporter left it out.
    pub fn timestamp_of(&self, frame_id: i64, sample: &FrameSample) -> f64 {
        sample
            .timestamp
            .unwrap_or(frame_id as f64 / self.metadata.fps)
    }

    /// Map a pixel-space point into normalized [0, 1] image space.
    pub fn normalize_pixel(&self, point: PixelPoint) -> (f64, f64) {
        (
            point[0] / f64::from(self.metadata.image_width),
            point[1] / f64::from(self.metadata.image_height),
        )
    }
}

fn resolve_metadata(raw: RawMetadata, frame_entries: usize) -> Result<RecordMetadata, LoadError> {
    let fps = raw.fps.unwrap_or(DEFAULT_FPS);
    if !fps.is_finite() || fps <= 0.0 {
        return Err(LoadError::InvalidMetadata(format!(
            "fps must be a positive number (got {fps})"
        )));
    }

    let image_width = raw.image_width.unwrap_or(DEFAULT_IMAGE_WIDTH);
    let image_height = raw.image_height.unwrap_or(DEFAULT_IMAGE_HEIGHT);
    if image_width == 0 || image_height == 0 {
        return Err(LoadError::InvalidMetadata(format!(
            "image dimensions must be non-zero (got {image_width}x{image_height})"
        )));
    }

    let total_frames = match raw.total_frames {
        Some(count) if count > 0 => usize::try_from(count).map_err(|_| {
            LoadError::InvalidMetadata(format!("total_frames {count} does not fit in memory"))
        })?,
        _ => frame_entries,
    };

    Ok(RecordMetadata {
        fps,
        image_width,
        image_height,
        total_frames,
    })
}
