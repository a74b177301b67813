use std::ffi::CString;

use leptess::tesseract::TessApi;
use opencv::core::Mat;
use opencv::core::Rect;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use tracing::{debug, warn};

use super::Candidate;
use crate::config::OcrConfig;
use crate::error::{PlateError, Result};
use crate::metrics;

/// Anything that turns a grayscale region into raw text.
pub trait TextRecognizer {
    fn recognize(&mut self, region: &Mat) -> Result<String>;
}

/// Tesseract, set up for a single line of plate characters.
pub struct TessRecognizer {
    ocr: TessApi,
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|e| PlateError::OcrInit(e.to_string()))
}

impl TessRecognizer {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let mut api = TessApi::new(config.datapath.as_deref(), &config.language)
            .map_err(|e| PlateError::OcrInit(format!("{e:?}")))?;

        let variables = [
            ("tessedit_char_whitelist", config.whitelist.clone()),
            ("tessedit_pageseg_mode", config.page_seg_mode.to_string()),
        ];
        for (name, value) in variables {
            api.raw
                .set_variable(&c_string(name)?, &c_string(&value)?)
                .map_err(|e| PlateError::OcrInit(format!("{name}: {e:?}")))?;
        }

        Ok(Self { ocr: api })
    }
}

impl TextRecognizer for TessRecognizer {
    fn recognize(&mut self, region: &Mat) -> Result<String> {
        let cols = region.cols();
        let rows = region.rows();
        self.ocr
            .raw
            .set_image(region.data_bytes()?, cols, rows, 1, cols)
            .map_err(|e| PlateError::Ocr(format!("{e:?}")))?;

        self.ocr
            .get_utf8_text()
            .map_err(|e| PlateError::Ocr(format!("{e:?}")))
    }
}

/// Trims, drops every whitespace character and uppercases.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<String>().to_uppercase()
}

/// Crops candidates out of the grayscale frame and reads them.
pub struct TextReader<R> {
    recognizer: R,
}

impl<R: TextRecognizer> TextReader<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Normalized text of the candidate region. Recognizer failures come back
    /// as an empty string, which the format check then drops.
    pub fn read(&mut self, gray: &Mat, candidate: &Candidate) -> String {
        let region = match crop(gray, candidate.rect) {
            Ok(region) => region,
            Err(e) => {
                warn!("cannot crop candidate {:?}: {e}", candidate.rect);
                return String::new();
            }
        };

        let timer = metrics::OCR_SECONDS.start_timer();
        let raw = self.recognizer.recognize(&region);
        timer.observe_duration();

        match raw {
            Ok(raw) => {
                let text = normalize_text(&raw);
                debug!(raw = raw.trim(), %text, "ocr result");
                text
            }
            Err(e) => {
                warn!("ocr failed: {e}");
                String::new()
            }
        }
    }
}

/// Copies `rect`, clamped to the image, into its own contiguous buffer.
fn crop(image: &Mat, rect: Rect) -> Result<Mat> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width).min(image.cols());
    let y1 = (rect.y + rect.height).min(image.rows());
    if x1 <= x0 || y1 <= y0 {
        return Err(PlateError::EmptyFrame);
    }
    let clamped = Rect::new(x0, y0, x1 - x0, y1 - y0);

    let view = image.apply_1(clamped)?;
    Ok(view.try_clone()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1};

    struct Scripted {
        reply: Result<String>,
        seen: Vec<(i32, i32)>,
    }

    impl TextRecognizer for Scripted {
        fn recognize(&mut self, region: &Mat) -> Result<String> {
            self.seen.push((region.cols(), region.rows()));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(PlateError::Ocr("engine gave up".to_string())),
            }
        }
    }

    fn gray() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC1, Scalar::all(200.0)).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  ab-123-cd\n"), "AB-123-CD");
        assert_eq!(normalize_text("AB 123\tCD"), "AB123CD");
        assert_eq!(normalize_text(" \n "), "");
    }

    #[test]
    fn test_read_normalizes_recognizer_output() {
        let mut reader = TextReader::new(Scripted {
            reply: Ok(" ab-123 -cd \n".to_string()),
            seen: vec![],
        });

        let text = reader.read(&gray(), &Candidate::new(Rect::new(100, 200, 180, 45)));

        assert_eq!(text, "AB-123-CD");
        assert_eq!(reader.recognizer.seen, vec![(180, 45)]);
    }

    #[test]
    fn test_read_clamps_to_frame() {
        let mut reader = TextReader::new(Scripted {
            reply: Ok(String::new()),
            seen: vec![],
        });

        reader.read(&gray(), &Candidate::new(Rect::new(600, 460, 100, 40)));

        assert_eq!(reader.recognizer.seen, vec![(40, 20)]);
    }

    #[test]
    fn test_recognizer_error_reads_as_empty() {
        let mut reader = TextReader::new(Scripted {
            reply: Err(PlateError::Ocr(String::new())),
            seen: vec![],
        });

        let text = reader.read(&gray(), &Candidate::new(Rect::new(10, 10, 100, 30)));

        assert!(text.is_empty());
    }

    #[test]
    fn test_crop_is_contiguous() {
        let region = crop(&gray(), Rect::new(5, 7, 90, 30)).unwrap();
        assert!(region.is_continuous());
        assert_eq!(region.data_bytes().unwrap().len(), 90 * 30);
    }
}
