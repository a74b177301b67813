use std::sync::Arc;

use opencv::prelude::Mat;
use tracing::{debug, info, warn};

use super::bounding_box_render::annotate;
use super::candidates::{CandidateExtractor, GeometryFilter};
use super::dedup::{Clock, DedupDecision, PlateLedger, SystemClock};
use super::format::FormatValidator;
use super::preprocess::Preprocessor;
use super::text_reader::{TextReader, TextRecognizer};
use super::video_reader::FrameSource;
use super::Overlay;
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::metrics;

/// Consumer of annotated frames.
pub trait FrameSink {
    fn publish(&mut self, frame: &Mat) -> Result<()>;
}

/// Outcome of one frame.
pub struct FrameReport {
    /// The resized color frame with the overlay drawn on it.
    pub annotated: Mat,
    pub overlay: Overlay,
    /// Set only when a plate passed validation.
    pub decision: Option<DedupDecision>,
}

pub struct PlatePipeline<R> {
    preprocessor: Preprocessor,
    extractor: CandidateExtractor,
    reader: TextReader<R>,
    validator: FormatValidator,
    ledger: Arc<PlateLedger>,
    clock: Box<dyn Clock>,
}

impl<R: TextRecognizer> PlatePipeline<R> {
    pub fn new(config: &DetectionConfig, recognizer: R, ledger: Arc<PlateLedger>) -> Result<Self> {
        Ok(Self {
            preprocessor: Preprocessor::new(config)?,
            extractor: CandidateExtractor::new(GeometryFilter::new(config.geometry.clone())),
            reader: TextReader::new(recognizer),
            validator: FormatValidator::new(config.min_text_len)?,
            ledger,
            clock: Box::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn ledger(&self) -> &Arc<PlateLedger> {
        &self.ledger
    }

    /// Runs one frame through every stage. Only the first admitted candidate
    /// is read; the annotated frame is produced whatever the outcome.
    pub fn process_frame(&mut self, frame: &Mat) -> Result<FrameReport> {
        metrics::FRAMES_PROCESSED.inc();
        let prepared = self.preprocessor.prepare(frame)?;

        let mut decision = None;
        let overlay = match self.extractor.first_candidate(&prepared.mask)? {
            None => Overlay::NoPlate,
            Some(candidate) => {
                metrics::CANDIDATES_ADMITTED.inc();
                let text = self.reader.read(&prepared.gray, &candidate);
                let plate = self.validator.validate(&text);

                match &plate {
                    Some(plate) => {
                        let outcome = self.ledger.observe(plate, self.clock.now());
                        if let DedupDecision::Reported { .. } = outcome {
                            metrics::PLATES_REPORTED.inc();
                        }
                        decision = Some(outcome);
                    }
                    None => {
                        metrics::OCR_MISSES.inc();
                        debug!(%text, rect = ?candidate.rect, "candidate text is not a plate");
                    }
                }

                Overlay::Candidate {
                    rect: candidate.rect,
                    plate,
                }
            }
        };

        let mut annotated = prepared.color;
        annotate(&mut annotated, &overlay)?;

        Ok(FrameReport {
            annotated,
            overlay,
            decision,
        })
    }
}

/// Blocking frame loop: read, process, publish, until the source gives out.
///
/// A sink that fails is logged and skipped for that frame. Returns the number
/// of frames processed.
pub fn run<S, R>(
    source: &mut S,
    pipeline: &mut PlatePipeline<R>,
    sinks: &mut [Box<dyn FrameSink>],
) -> Result<u64>
where
    S: FrameSource + ?Sized,
    R: TextRecognizer,
{
    let mut frames = 0;
    while let Some(frame) = source.read()? {
        let report = pipeline.process_frame(&frame)?;
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.publish(&report.annotated) {
                warn!("cannot publish frame {frames}: {e}");
            }
        }
        frames += 1;
    }

    info!(frames, "frame source ended");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlateError;
    use opencv::core::{sum_elems, Rect, Scalar, CV_8UC3};
    use opencv::imgproc::{rectangle, FILLED, LINE_8};
    use opencv::prelude::MatTraitConst;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    const PLATE: Rect = Rect {
        x: 220,
        y: 300,
        width: 200,
        height: 60,
    };

    struct FixedText(&'static str);

    impl TextRecognizer for FixedText {
        fn recognize(&mut self, _region: &Mat) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock()
        }
    }

    struct Frames(VecDeque<Mat>);

    impl FrameSource for Frames {
        fn read(&mut self) -> Result<Option<Mat>> {
            Ok(self.0.pop_front())
        }
    }

    struct Collect(Arc<Mutex<Vec<(i32, i32)>>>);

    impl FrameSink for Collect {
        fn publish(&mut self, frame: &Mat) -> Result<()> {
            self.0.lock().push((frame.cols(), frame.rows()));
            Ok(())
        }
    }

    struct Broken;

    impl FrameSink for Broken {
        fn publish(&mut self, _frame: &Mat) -> Result<()> {
            Err(PlateError::Encode("test"))
        }
    }

    /// Dark frame with a block of vertical stripes where the plate would be.
    /// The stripes give the dense vertical edges that characters produce.
    fn plate_frame() -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();
        for x in (PLATE.x..PLATE.x + PLATE.width).step_by(8) {
            let stripe = Rect::new(x, PLATE.y, 4, PLATE.height);
            rectangle(&mut frame, stripe, Scalar::all(255.0), FILLED, LINE_8, 0).unwrap();
        }
        frame
    }

    fn flat_frame() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(60.0)).unwrap()
    }

    fn pipeline(text: &'static str, clock: ManualClock) -> PlatePipeline<FixedText> {
        let ledger = Arc::new(PlateLedger::default());
        PlatePipeline::new(&DetectionConfig::default(), FixedText(text), ledger)
            .unwrap()
            .with_clock(clock)
    }

    fn near(a: i32, b: i32) -> bool {
        (a - b).abs() <= 12
    }

    #[test]
    fn test_clean_plate_is_recorded() {
        let mut pipeline = pipeline("AB-123-CD", ManualClock::new());

        let report = pipeline.process_frame(&plate_frame()).unwrap();

        match &report.overlay {
            Overlay::Candidate { rect, plate } => {
                assert!(near(rect.x, PLATE.x), "{rect:?}");
                assert!(near(rect.y, PLATE.y), "{rect:?}");
                assert!(near(rect.x + rect.width, PLATE.x + PLATE.width), "{rect:?}");
                assert!(near(rect.y + rect.height, PLATE.y + PLATE.height), "{rect:?}");
                assert_eq!(plate.as_ref().map(|p| p.as_str()), Some("AB-123-CD"));
            }
            other => panic!("expected a candidate, got {other:?}"),
        }
        assert_eq!(report.decision, Some(DedupDecision::Reported { appended: true }));
        assert_eq!(pipeline.ledger().recent_plates(), vec!["AB-123-CD"]);
        assert_eq!(report.annotated.cols(), 640);
        assert_eq!(report.annotated.rows(), 480);
    }

    #[test]
    fn test_same_plate_one_second_later() {
        let clock = ManualClock::new();
        let mut pipeline = pipeline("AB-123-CD", clock.clone());

        pipeline.process_frame(&plate_frame()).unwrap();
        let first_seen = pipeline.ledger().last_seen().map(|(_, at)| at);
        clock.advance(Duration::from_secs(1));
        let report = pipeline.process_frame(&plate_frame()).unwrap();

        assert_eq!(report.decision, Some(DedupDecision::Suppressed));
        assert_eq!(pipeline.ledger().recent_plates(), vec!["AB-123-CD"]);
        assert_eq!(pipeline.ledger().last_seen().map(|(_, at)| at), first_seen);
    }

    #[test]
    fn test_same_plate_four_seconds_later() {
        let clock = ManualClock::new();
        let mut pipeline = pipeline("AB-123-CD", clock.clone());

        pipeline.process_frame(&plate_frame()).unwrap();
        clock.advance(Duration::from_secs(4));
        let report = pipeline.process_frame(&plate_frame()).unwrap();

        assert_eq!(report.decision, Some(DedupDecision::Reported { appended: false }));
        assert_eq!(
            pipeline.ledger().last_seen().map(|(_, at)| at),
            Some(clock.now())
        );
        assert_eq!(pipeline.ledger().recent_plates().len(), 1);
    }

    #[test]
    fn test_frame_without_plate_shape() {
        let mut pipeline = pipeline("AB-123-CD", ManualClock::new());

        let report = pipeline.process_frame(&flat_frame()).unwrap();

        assert_eq!(report.overlay, Overlay::NoPlate);
        assert_eq!(report.decision, None);
        assert!(pipeline.ledger().recent_plates().is_empty());

        // NO_PLATE_MESSAGE is drawn in yellow in the top left corner
        let corner = Rect::new(0, 0, 320, 30);
        let drawn = sum_elems(&report.annotated.apply_1(corner).unwrap()).unwrap();
        let plain = sum_elems(&flat_frame().apply_1(corner).unwrap()).unwrap();
        assert!(drawn[1] > plain[1]);
        assert!(drawn[2] > plain[2]);
    }

    #[test]
    fn test_unreadable_candidate_is_dropped() {
        let mut pipeline = pipeline("A8-1Z3", ManualClock::new());

        let report = pipeline.process_frame(&plate_frame()).unwrap();

        assert!(matches!(report.overlay, Overlay::Candidate { plate: None, .. }));
        assert_eq!(report.decision, None);
        assert!(pipeline.ledger().recent_plates().is_empty());
    }

    #[test]
    fn test_run_until_source_ends() {
        let mut pipeline = pipeline("AB-123-CD", ManualClock::new());
        let mut source = Frames(VecDeque::from(vec![plate_frame(), flat_frame(), plate_frame()]));
        let published = Arc::new(Mutex::new(Vec::new()));
        let mut sinks: Vec<Box<dyn FrameSink>> =
            vec![Box::new(Broken), Box::new(Collect(Arc::clone(&published)))];

        let frames = run(&mut source, &mut pipeline, &mut sinks).unwrap();

        assert_eq!(frames, 3);
        assert_eq!(*published.lock(), vec![(640, 480); 3]);
        assert_eq!(pipeline.ledger().recent_plates(), vec!["AB-123-CD"]);
    }

    #[test]
    fn test_empty_frame_stops_run() {
        let mut pipeline = pipeline("AB-123-CD", ManualClock::new());
        let mut source = Frames(VecDeque::from(vec![Mat::default()]));

        let result = run(&mut source, &mut pipeline, &mut []);

        assert!(matches!(result, Err(PlateError::EmptyFrame)));
    }
}
