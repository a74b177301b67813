use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use gstreamer::parse_launch;
use gstreamer::prelude::Cast;
use gstreamer::prelude::CastNone;
use gstreamer::prelude::ElementExt;
use gstreamer::prelude::GstBinExt;
use gstreamer::prelude::MulDiv;
use gstreamer::Buffer;
use gstreamer::Caps;
use gstreamer_video::VideoCapsBuilder;
use gstreamer_video::VideoFormat;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use tracing::{debug, info, warn};

use super::pipeline::FrameSink;
use crate::error::{PlateError, Result};

/// Streams annotated frames as H.264 over RTP/UDP.
pub struct RtpSink {
    pipeline: gstreamer::Pipeline,
    width: i32,
    height: i32,
    fps: u64,
    frames: u64,
    buffer_s: Sender<Buffer>,
}

pub fn create_caps(width: i32, height: i32, fps: i32) -> Caps {
    VideoCapsBuilder::new()
        .width(width)
        .height(height)
        .framerate(gstreamer::Fraction::new(fps, 1))
        .format(VideoFormat::Bgr)
        .build()
}

fn gst_error(e: impl std::fmt::Display) -> PlateError {
    PlateError::Gstreamer(e.to_string())
}

impl RtpSink {
    pub fn new(width: i32, height: i32, fps: u32, host: &str, port: u16) -> Result<Self> {
        gstreamer::init().map_err(gst_error)?;
        let pipeline_str = format!(
            "appsrc name=frames ! videoconvert ! x264enc tune=zerolatency bitrate=500 speed-preset=superfast ! rtph264pay ! udpsink host={host} port={port}"
        );

        let pipeline = parse_launch(&pipeline_str)
            .map_err(gst_error)?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| gst_error("launch line is not a pipeline"))?;

        let app_src = pipeline
            .by_name("frames")
            .and_dynamic_cast::<gstreamer_app::AppSrc>()
            .map_err(|_| gst_error("missing appsrc"))?;

        app_src.set_caps(Some(&create_caps(width, height, fps as i32)));
        app_src.set_format(gstreamer::Format::Time);

        // One frame in flight, the encoder pulls at its own pace.
        let (buffer_s, buffer_r) = bounded(1);
        Self::feed(&app_src, buffer_r);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(gst_error)?;
        info!("streaming rtp to {host}:{port}");

        Ok(Self {
            pipeline,
            width,
            height,
            fps: fps.max(1) as u64,
            frames: 0,
            buffer_s,
        })
    }

    fn feed(app_src: &gstreamer_app::AppSrc, receiver: Receiver<Buffer>) {
        app_src.set_callbacks(
            gstreamer_app::AppSrcCallbacks::builder()
                .need_data(move |appsrc, _| {
                    if let Ok(buffer) = receiver.recv() {
                        if let Err(e) = appsrc.push_buffer(buffer) {
                            warn!("appsrc refused buffer: {e:?}");
                        }
                    }
                })
                .build(),
        );
    }
}

impl FrameSink for RtpSink {
    fn publish(&mut self, frame: &Mat) -> Result<()> {
        if frame.cols() != self.width || frame.rows() != self.height {
            return Err(gst_error(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.cols(),
                frame.rows(),
                self.width,
                self.height
            )));
        }

        let duration = gstreamer::ClockTime::SECOND
            .mul_div_floor(1, self.fps)
            .ok_or_else(|| gst_error("frame duration overflow"))?;
        let pts = duration * self.frames;

        let data = frame.data_bytes()?;
        let mut buffer = Buffer::with_size(data.len()).map_err(gst_error)?;
        {
            let buffer = buffer
                .get_mut()
                .ok_or_else(|| gst_error("buffer is shared"))?;
            buffer.copy_from_slice(0, data).map_err(|_| gst_error("cannot fill buffer"))?;
            buffer.set_duration(duration);
            buffer.set_pts(pts);
            buffer.set_dts(pts);
        }

        match self.buffer_s.try_send(buffer) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("encoder busy, frame {} dropped", self.frames),
            Err(TrySendError::Disconnected(_)) => return Err(gst_error("appsrc is gone")),
        }
        self.frames += 1;
        Ok(())
    }
}

impl Drop for RtpSink {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("cannot stop rtp pipeline: {e}");
        }
    }
}
