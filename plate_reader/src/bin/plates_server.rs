use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use plate_reader::config::load_optional;
use plate_reader::metrics;
use plate_reader::plate_detection::dedup::{DedupConfig, PlateLedger};
use plate_reader::plate_detection::mjpeg::mjpeg_feed;
use plate_reader::plate_detection::pipeline::{run, FrameSink, PlatePipeline};
use plate_reader::plate_detection::text_reader::TessRecognizer;
use plate_reader::plate_detection::video_reader::VideoReader;
use plate_reader::server::{self, ServerState};
use plate_reader::utils::{init_tracing, Profiler};

/// Reads license plates from a live source and serves them over HTTP.
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
    /// Address to serve on
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config =
        load_optional(args.config.as_deref()).context("cannot load configuration")?;
    config.override_source(args.camera, args.file);
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    metrics::register();
    let profiler = Profiler::start(&config.profiling)?;

    let ledger = Arc::new(PlateLedger::new(DedupConfig::from(&config.detection)));
    let (feed, frames) = mjpeg_feed();
    let mut source =
        VideoReader::from_config(&config.source).context("cannot open frame source")?;

    let detection = config.detection.clone();
    let ocr = config.ocr.clone();
    let pipeline_ledger = Arc::clone(&ledger);
    thread::Builder::new()
        .name("plate_pipeline".to_string())
        .spawn(move || {
            let result = TessRecognizer::new(&ocr)
                .and_then(|recognizer| PlatePipeline::new(&detection, recognizer, pipeline_ledger))
                .and_then(|mut pipeline| {
                    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(feed)];
                    run(&mut source, &mut pipeline, &mut sinks)
                });
            if let Err(e) = result {
                error!("processing stopped: {e}");
            }
        })?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
        }
    };
    server::serve(ServerState::new(ledger, frames), config.server.bind, shutdown).await?;

    info!("server stopped");
    profiler.stop();
    Ok(())
}
