use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlateError {
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("received an empty frame")]
    EmptyFrame,
    #[error("cannot open video source {0}")]
    SourceUnavailable(String),
    #[error("cannot initialize tesseract: {0}")]
    OcrInit(String),
    #[error("ocr failed: {0}")]
    Ocr(String),
    #[error("invalid plate pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("cannot encode frame as {0}")]
    Encode(&'static str),
    #[error("profiler error: {0}")]
    Profiler(#[from] pyroscope::PyroscopeError),
    #[cfg(feature = "rtp")]
    #[error("gstreamer error: {0}")]
    Gstreamer(String),
}

pub type Result<T> = std::result::Result<T, PlateError>;
