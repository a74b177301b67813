use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FRAMES_PROCESSED: IntCounter =
        IntCounter::new("plate_frames_processed_total", "Frames run through the pipeline")
            .expect("metric can be created");
    pub static ref CANDIDATES_ADMITTED: IntCounter = IntCounter::new(
        "plate_candidates_admitted_total",
        "Frames with a region passing the geometry filter"
    )
    .expect("metric can be created");
    pub static ref OCR_MISSES: IntCounter = IntCounter::new(
        "plate_ocr_misses_total",
        "Candidates whose text failed normalization or format validation"
    )
    .expect("metric can be created");
    pub static ref PLATES_REPORTED: IntCounter = IntCounter::new(
        "plate_reports_total",
        "Validated plates reported outside the dedup window"
    )
    .expect("metric can be created");
    pub static ref OCR_SECONDS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "plate_ocr_seconds",
        "Time spent in the text recognizer"
    ))
    .expect("metric can be created");
}

/// Registers the pipeline metrics. Safe to call more than once.
pub fn register() {
    let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
        Box::new(FRAMES_PROCESSED.clone()),
        Box::new(CANDIDATES_ADMITTED.clone()),
        Box::new(OCR_MISSES.clone()),
        Box::new(PLATES_REPORTED.clone()),
        Box::new(OCR_SECONDS.clone()),
    ];
    for collector in collectors {
        // AlreadyReg on repeated calls
        let _ = REGISTRY.register(collector);
    }
}

/// Renders the registry in the Prometheus text format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("cannot encode metrics: {e}");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
