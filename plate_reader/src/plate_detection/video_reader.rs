use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use tracing::info;

use crate::config::SourceConfig;
use crate::error::{PlateError, Result};
use crate::utils::FpsLimiter;

/// Supplier of raw frames.
///
/// `Ok(None)` means the source is exhausted or the read failed. Callers stop
/// there, there is no reconnect.
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<Mat>>;
}

pub struct VideoReader {
    capture: VideoCapture,
    limiter: Option<FpsLimiter>,
}

impl VideoReader {
    pub fn camera(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, CAP_ANY)?;
        Self::opened(capture, format!("camera {index}"), None)
    }

    pub fn file(path: &str, max_fps: Option<u32>) -> Result<Self> {
        let capture = VideoCapture::from_file(path, CAP_ANY)?;
        Self::opened(capture, path.to_string(), max_fps)
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Self::file(path, config.max_fps),
            None => Self::camera(config.camera),
        }
    }

    fn opened(capture: VideoCapture, name: String, max_fps: Option<u32>) -> Result<Self> {
        if !capture.is_opened()? {
            return Err(PlateError::SourceUnavailable(name));
        }
        info!("reading frames from {name}");
        Ok(Self {
            capture,
            limiter: max_fps.map(FpsLimiter::new),
        })
    }
}

impl FrameSource for VideoReader {
    fn read(&mut self) -> Result<Option<Mat>> {
        if let Some(limiter) = self.limiter.as_mut() {
            limiter.wait();
        }

        let mut image = Mat::default();
        let grabbed = self.capture.read(&mut image)?;
        if !grabbed || image.empty() {
            return Ok(None);
        }
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_unavailable() {
        let result = VideoReader::file("/nonexistent/plates.mp4", None);
        assert!(matches!(
            result,
            Err(PlateError::SourceUnavailable(_)) | Err(PlateError::OpenCv(_))
        ));
    }
}
