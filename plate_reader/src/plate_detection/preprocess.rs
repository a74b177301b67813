use opencv::core::Mat;
use opencv::core::Point;
use opencv::core::Size;
use opencv::core::BORDER_CONSTANT;
use opencv::core::BORDER_DEFAULT;
use opencv::core::CV_8U;
use opencv::imgproc::cvt_color;
use opencv::imgproc::gaussian_blur;
use opencv::imgproc::get_structuring_element;
use opencv::imgproc::morphology_default_border_value;
use opencv::imgproc::morphology_ex;
use opencv::imgproc::resize;
use opencv::imgproc::sobel;
use opencv::imgproc::threshold;
use opencv::imgproc::COLOR_BGR2GRAY;
use opencv::imgproc::INTER_LINEAR;
use opencv::imgproc::MORPH_CLOSE;
use opencv::imgproc::MORPH_RECT;
use opencv::imgproc::THRESH_BINARY;
use opencv::imgproc::THRESH_OTSU;
use opencv::prelude::MatTraitConst;

use crate::config::DetectionConfig;
use crate::error::{PlateError, Result};

/// A frame in the three shapes the rest of the pipeline needs.
pub struct PreparedFrame {
    /// Resized BGR frame, drawn on for display.
    pub color: Mat,
    /// Grayscale before any blur, cropped for OCR.
    pub gray: Mat,
    /// Binary mask of horizontally elongated, edge dense regions.
    pub mask: Mat,
}

pub struct Preprocessor {
    size: Size,
    close_kernel: Mat,
}

impl Preprocessor {
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        let (kernel_w, kernel_h) = config.close_kernel;
        let close_kernel = get_structuring_element(
            MORPH_RECT,
            Size::new(kernel_w, kernel_h),
            Point::new(-1, -1),
        )?;

        Ok(Self {
            size: Size::new(config.frame_width, config.frame_height),
            close_kernel,
        })
    }

    pub fn prepare(&self, frame: &Mat) -> Result<PreparedFrame> {
        if frame.empty() {
            return Err(PlateError::EmptyFrame);
        }

        let mut color = Mat::default();
        resize(frame, &mut color, self.size, 0.0, 0.0, INTER_LINEAR)?;

        let mut gray = Mat::default();
        cvt_color(&color, &mut gray, COLOR_BGR2GRAY, 0)?;

        let mut blur = Mat::default();
        gaussian_blur(&gray, &mut blur, Size::new(5, 5), 0.0, 0.0, BORDER_DEFAULT)?;

        // 8 bit output: falling edges clip to zero, only rising ones remain.
        let mut sobel_x = Mat::default();
        sobel(&blur, &mut sobel_x, CV_8U, 1, 0, 3, 1.0, 0.0, BORDER_DEFAULT)?;

        let mut edges = Mat::default();
        threshold(&sobel_x, &mut edges, 0.0, 255.0, THRESH_BINARY | THRESH_OTSU)?;

        let mut mask = Mat::default();
        morphology_ex(
            &edges,
            &mut mask,
            MORPH_CLOSE,
            &self.close_kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            morphology_default_border_value()?,
        )?;

        Ok(PreparedFrame { color, gray, mask })
    }
}
