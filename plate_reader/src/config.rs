//! Runtime configuration
//!
//! Settings are read from a TOML file. Every field has a default, so a missing
//! section or key falls back to the values the detector was tuned with.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub detection: DetectionConfig,
    pub ocr: OcrConfig,
    pub server: ServerConfig,
    pub profiling: ProfilingConfig,
}

/// Where frames come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Camera index, used when `path` is not set
    pub camera: i32,
    /// Video file or stream URL
    pub path: Option<String>,
    /// Pace file playback to this rate. Cameras pace themselves.
    pub max_fps: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            camera: 0,
            path: None,
            max_fps: None,
        }
    }
}

/// Geometry admission rules for plate candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            min_aspect: 1.2,
            max_aspect: 6.5,
            min_width: 80,
            min_height: 20,
            max_width: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Every frame is resized to this width before analysis
    pub frame_width: i32,
    pub frame_height: i32,
    /// Structuring element used to merge character edges, as (width, height)
    pub close_kernel: (i32, i32),
    pub geometry: GeometryConfig,
    /// Normalized OCR text shorter than this is discarded
    pub min_text_len: usize,
    /// Seconds during which the same plate is not reported again
    pub dedup_window_secs: f64,
    /// Size of the recent plates list
    pub recent_capacity: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            close_kernel: (17, 5),
            geometry: GeometryConfig::default(),
            min_text_len: 5,
            dedup_window_secs: 3.0,
            recent_capacity: 5,
        }
    }
}

impl DetectionConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs_f64(self.dedup_window_secs.max(0.0))
    }
}

/// Tesseract settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory holding the `.traineddata` files. System default when unset.
    pub datapath: Option<String>,
    pub language: String,
    pub whitelist: String,
    /// Tesseract page segmentation mode, 7 treats the crop as a single line
    pub page_seg_mode: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            datapath: None,
            language: "eng".to_string(),
            whitelist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-".to_string(),
            page_seg_mode: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Pyroscope server, profiling is off when unset
    pub server_url: Option<String>,
}

impl AppConfig {
    /// Command line choice of source. A file wins over a camera index.
    pub fn override_source(&mut self, camera: Option<i32>, path: Option<String>) {
        if let Some(camera) = camera {
            self.source.camera = camera;
            self.source.path = None;
        }
        if path.is_some() {
            self.source.path = path;
        }
    }
}

/// Defaults when no file is given.
pub fn load_optional(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(AppConfig::default()),
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}
