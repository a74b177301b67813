pub mod bounding_box_render;
pub mod candidates;
pub mod dedup;
pub mod format;
pub mod mjpeg;
pub mod pipeline;
pub mod preprocess;
#[cfg(feature = "rtp")]
pub mod rtp_sink;
pub mod text_reader;
pub mod video_reader;

use std::fmt;

use opencv::core::Rect;

/// Region of a frame that passed the geometry filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub rect: Rect,
}

impl Candidate {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }
}

/// OCR text that was normalized and matched the plate format.
///
/// Only [`format::FormatValidator`] hands these out.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlateRecord(String);

impl PlateRecord {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets drawn on the outgoing frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    NoPlate,
    Candidate {
        rect: Rect,
        plate: Option<PlateRecord>,
    },
}
