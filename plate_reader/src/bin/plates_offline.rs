use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use opencv::core::Size;

use plate_reader::config::load_optional;
use plate_reader::metrics;
use plate_reader::plate_detection::bounding_box_render::VideoFileSink;
use plate_reader::plate_detection::dedup::{DedupConfig, PlateLedger};
use plate_reader::plate_detection::pipeline::{run, FrameSink, PlatePipeline};
use plate_reader::plate_detection::text_reader::TessRecognizer;
use plate_reader::plate_detection::video_reader::VideoReader;
use plate_reader::utils::{init_tracing, Profiler};

/// Reads license plates from a video file and records the annotated result.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Video to process
    input: String,
    /// Annotated Motion JPEG output
    #[arg(short, long, default_value = "output.avi")]
    output: String,
    /// Frame rate written in the output header
    #[arg(long, default_value_t = 25.0)]
    fps: f64,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config =
        load_optional(args.config.as_deref()).context("cannot load configuration")?;
    config.override_source(None, Some(args.input));
    config.source.max_fps = None;

    metrics::register();
    let profiler = Profiler::start(&config.profiling)?;

    let mut source =
        VideoReader::from_config(&config.source).context("cannot open frame source")?;
    let ledger = Arc::new(PlateLedger::new(DedupConfig::from(&config.detection)));
    let mut pipeline = PlatePipeline::new(
        &config.detection,
        TessRecognizer::new(&config.ocr).context("cannot start tesseract")?,
        Arc::clone(&ledger),
    )?;

    let size = Size::new(config.detection.frame_width, config.detection.frame_height);
    let mut sinks: Vec<Box<dyn FrameSink>> =
        vec![Box::new(VideoFileSink::new(&args.output, args.fps, size)?)];

    println!("Processing, waiting for video to end");
    let frames = run(&mut source, &mut pipeline, &mut sinks)?;
    drop(sinks);

    println!("Done, {frames} frames written to {}", args.output);
    for plate in ledger.recent_plates() {
        println!("{plate}");
    }

    profiler.stop();
    Ok(())
}
