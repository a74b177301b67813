use std::time::{Duration, Instant};

use pyroscope::pyroscope::PyroscopeAgentRunning;
use pyroscope::PyroscopeAgent;
use pyroscope_pprofrs::{pprof_backend, PprofConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ProfilingConfig;
use crate::error::Result;

/// Keeps a loop from running faster than a given rate.
pub struct FpsLimiter {
    fps_control: Instant,
    fps_wait: Duration,
}

impl FpsLimiter {
    pub fn new(fps: u32) -> Self {
        Self {
            fps_control: Instant::now(),
            fps_wait: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
        }
    }

    /// Sleeps for what is left of the current frame slot, then opens the next one.
    pub fn wait(&mut self) {
        let elapsed = self.fps_control.elapsed();

        if self.fps_wait > elapsed {
            spin_sleep::sleep(self.fps_wait - elapsed);
        }

        self.fps_control = Instant::now();
    }
}

/// Log to stderr, filtered by `RUST_LOG` with `plate_reader=info` as fallback.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("plate_reader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Continuous profiling, pushed to a Pyroscope server when one is configured.
pub struct Profiler {
    agent: Option<PyroscopeAgent<PyroscopeAgentRunning>>,
}

impl Profiler {
    pub fn start(config: &ProfilingConfig) -> Result<Self> {
        let Some(url) = &config.server_url else {
            return Ok(Self { agent: None });
        };

        let agent = PyroscopeAgent::builder(url.as_str(), "plate_reader")
            .backend(pprof_backend(PprofConfig::new().sample_rate(100)))
            .build()?
            .start()?;
        info!("profiling to {url}");
        Ok(Self { agent: Some(agent) })
    }

    pub fn is_running(&self) -> bool {
        self.agent.is_some()
    }

    pub fn stop(self) {
        if let Some(agent) = self.agent {
            match agent.stop() {
                Ok(ready) => ready.shutdown(),
                Err(e) => warn!("cannot stop profiler: {e}"),
            }
        }
    }
}
