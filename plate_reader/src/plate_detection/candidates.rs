use opencv::core::Mat;
use opencv::core::Point;
use opencv::core::Rect;
use opencv::core::Vector;
use opencv::imgproc::bounding_rect;
use opencv::imgproc::find_contours;
use opencv::imgproc::CHAIN_APPROX_SIMPLE;
use opencv::imgproc::RETR_EXTERNAL;
use tracing::trace;

use super::Candidate;
use crate::config::GeometryConfig;
use crate::error::Result;

/// Size and aspect rules a bounding box must meet to look like a plate.
#[derive(Clone, Debug)]
pub struct GeometryFilter {
    rules: GeometryConfig,
}

impl GeometryFilter {
    pub fn new(rules: GeometryConfig) -> Self {
        Self { rules }
    }

    pub fn admits(&self, rect: &Rect) -> bool {
        if rect.height <= 0 {
            return false;
        }
        let ratio = rect.width as f64 / rect.height as f64;
        let rules = &self.rules;

        ratio >= rules.min_aspect
            && ratio <= rules.max_aspect
            && rect.width >= rules.min_width
            && rect.height >= rules.min_height
            && rect.width <= rules.max_width
    }
}

impl Default for GeometryFilter {
    fn default() -> Self {
        Self::new(GeometryConfig::default())
    }
}

pub struct CandidateExtractor {
    filter: GeometryFilter,
}

impl CandidateExtractor {
    pub fn new(filter: GeometryFilter) -> Self {
        Self { filter }
    }

    /// Returns the first contour, in discovery order, whose bounding box passes
    /// the geometry filter. Later contours are not looked at, even when one of
    /// them would be a better plate.
    pub fn first_candidate(&self, mask: &Mat) -> Result<Option<Candidate>> {
        let mut contours = Vector::<Vector<Point>>::new();
        find_contours(
            mask,
            &mut contours,
            RETR_EXTERNAL,
            CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        for contour in contours.iter() {
            let rect = bounding_rect(&contour)?;
            if self.filter.admits(&rect) {
                return Ok(Some(Candidate::new(rect)));
            }
            trace!(?rect, "region rejected by geometry filter");
        }

        Ok(None)
    }
}
