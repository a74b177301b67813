use opencv::core::Point;
use opencv::core::Scalar;
use opencv::core::Size;
use opencv::imgproc::put_text;
use opencv::imgproc::rectangle;
use opencv::imgproc::FONT_HERSHEY_SIMPLEX;
use opencv::imgproc::LINE_8;
use opencv::prelude::Mat;
use opencv::prelude::VideoWriterTrait;
use opencv::prelude::VideoWriterTraitConst;
use opencv::videoio::VideoWriter;
use tracing::{debug, warn};

use super::pipeline::FrameSink;
use super::Overlay;
use crate::error::{PlateError, Result};

pub const NO_PLATE_MESSAGE: &str = "No plate detected";

/// Draws the outcome of one frame onto it.
pub fn annotate(image: &mut Mat, overlay: &Overlay) -> Result<()> {
    let red = Scalar::new(0.0, 0.0, 255.0, 0.0);
    let green = Scalar::new(0.0, 255.0, 0.0, 0.0);
    let yellow = Scalar::new(0.0, 255.0, 255.0, 0.0);

    match overlay {
        Overlay::NoPlate => {
            put_text(
                image,
                NO_PLATE_MESSAGE,
                Point::new(10, 20),
                FONT_HERSHEY_SIMPLEX,
                0.7,
                yellow,
                2,
                LINE_8,
                false,
            )?;
        }
        Overlay::Candidate { rect, plate } => {
            rectangle(image, *rect, red, 2, LINE_8, 0)?;
            if let Some(plate) = plate {
                put_text(
                    image,
                    plate.as_str(),
                    Point::new(rect.x, rect.y - 10),
                    FONT_HERSHEY_SIMPLEX,
                    0.8,
                    green,
                    2,
                    LINE_8,
                    false,
                )?;
            }
        }
    }

    Ok(())
}

/// Records annotated frames to a Motion JPEG `.avi` file.
pub struct VideoFileSink {
    writer: VideoWriter,
}

impl VideoFileSink {
    pub fn new(path: &str, fps: f64, size: Size) -> Result<Self> {
        let writer = VideoWriter::new(
            path,
            VideoWriter::fourcc('M', 'J', 'P', 'G')?,
            fps,
            size,
            true,
        )?;
        if !writer.is_opened()? {
            return Err(PlateError::SourceUnavailable(path.to_string()));
        }
        Ok(Self { writer })
    }
}

impl FrameSink for VideoFileSink {
    fn publish(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame)?;
        Ok(())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        debug!("releasing video writer");
        if let Err(e) = self.writer.release() {
            warn!("cannot release video writer: {e}");
        }
    }
}
