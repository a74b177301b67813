use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use plate_reader::config::load_optional;
use plate_reader::metrics;
use plate_reader::plate_detection::dedup::{DedupConfig, PlateLedger};
use plate_reader::plate_detection::pipeline::{run, FrameSink, PlatePipeline};
use plate_reader::plate_detection::rtp_sink::RtpSink;
use plate_reader::plate_detection::text_reader::TessRecognizer;
use plate_reader::plate_detection::video_reader::VideoReader;
use plate_reader::utils::{init_tracing, Profiler};

/// Reads license plates and streams the annotated video over RTP.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Camera index
    #[arg(long)]
    camera: Option<i32>,
    /// Video file or stream URL, instead of a camera
    #[arg(short, long)]
    file: Option<String>,
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 5004)]
    port: u16,
    /// Stream frame rate, also the pace of file playback
    #[arg(long, default_value_t = 25)]
    fps: u32,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config =
        load_optional(args.config.as_deref()).context("cannot load configuration")?;
    config.override_source(args.camera, args.file);
    config.source.max_fps.get_or_insert(args.fps);

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

    let rtp = RtpSink::new(
        config.detection.frame_width,
        config.detection.frame_height,
        args.fps,
        &args.host,
        args.port,
    )?;
    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(rtp)];

    println!("Starting, waiting for video to end");
    run(&mut source, &mut pipeline, &mut sinks)?;
    println!("Done, plates seen: {:?}", ledger.recent_plates());

    profiler.stop();
    Ok(())
}
