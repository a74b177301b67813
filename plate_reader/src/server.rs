//! HTTP surface: video feed, recent plates, stop switch and metrics.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use warp::http::header::CONTENT_TYPE;
use warp::http::{HeaderValue, StatusCode};
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::metrics;
use crate::plate_detection::dedup::PlateLedger;
use crate::plate_detection::mjpeg::{FrameFeed, MJPEG_CONTENT_TYPE};

const INDEX_PAGE: &str = include_str!("../assets/index.html");

pub type StopHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct ServerState {
    ledger: Arc<PlateLedger>,
    frames: FrameFeed,
    on_stop: StopHandler,
}

impl ServerState {
    /// State whose stop switch ends the process on the spot.
    pub fn new(ledger: Arc<PlateLedger>, frames: FrameFeed) -> Self {
        Self {
            ledger,
            frames,
            on_stop: Arc::new(exit_now),
        }
    }

    pub fn with_stop_handler(mut self, on_stop: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Arc::new(on_stop);
        self
    }
}

/// Exits without unwinding. Nothing is dropped on this path, so the capture
/// device and any open video writer are left to the OS.
fn exit_now() {
    warn!("stop requested, exiting without releasing the capture device");
    std::process::exit(0);
}

#[derive(Debug, Deserialize)]
struct StopRequest {
    action: Option<String>,
}

fn with_state(state: ServerState) -> impl Filter<Extract = (ServerState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(state: ServerState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(INDEX_PAGE));

    let plates = warp::path!("get_plaques")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: ServerState| warp::reply::json(&state.ledger.recent_plates()));

    let feed = warp::path!("video_feed")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(video_feed);

    let stop = warp::path!("stop_server")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .map(stop_server);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .map(metrics::render);

    index
        .or(plates)
        .or(feed)
        .or(stop)
        .or(metrics)
        .with(warp::trace::request())
}

fn video_feed(state: ServerState) -> Response {
    let parts = WatchStream::new(state.frames.subscribe())
        .filter_map(|part| part.map(Ok::<_, Infallible>));

    let mut response = Response::new(Body::wrap_stream(parts));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(MJPEG_CONTENT_TYPE));
    response
}

fn stop_server(request: StopRequest, state: ServerState) -> Response {
    if request.action.as_deref() == Some("stop") {
        (state.on_stop)();
        return warp::reply::with_status("stopping", StatusCode::OK).into_response();
    }
    warn!(action = ?request.action, "unrecognized stop request");
    warp::reply::with_status("unrecognized action", StatusCode::BAD_REQUEST).into_response()
}

/// Serves until `shutdown` resolves.
pub async fn serve(
    state: ServerState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!("listening on http://{bound}");
    server.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate_detection::format::FormatValidator;
    use crate::plate_detection::mjpeg::mjpeg_feed;
    use crate::plate_detection::pipeline::FrameSink;
    use opencv::core::{Mat, Scalar, CV_8UC3};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn state() -> (ServerState, Arc<PlateLedger>) {
        let ledger = Arc::new(PlateLedger::default());
        let (_feed, frames) = mjpeg_feed();
        let state = ServerState::new(Arc::clone(&ledger), frames)
            .with_stop_handler(|| panic!("stop handler must not run"));
        (state, ledger)
    }

    #[tokio::test]
    async fn test_get_plates_as_json() {
        let (state, ledger) = state();
        let validator = FormatValidator::new(5).unwrap();
        for text in ["AB-123-CD", "EF456GH"] {
            ledger.observe(&validator.validate(text).unwrap(), Instant::now());
        }

        let response = warp::test::request()
            .path("/get_plaques")
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let plates: Vec<String> = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(plates, vec!["AB-123-CD", "EF456GH"]);
    }

    #[tokio::test]
    async fn test_index_page() {
        let (state, _) = state();

        let response = warp::test::request().path("/").reply(&routes(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8_lossy(response.body());
        assert!(body.contains("/video_feed"));
        assert!(body.contains("/get_plaques"));
    }

    #[tokio::test]
    async fn test_stop_with_unknown_action() {
        let (state, _) = state();

        let response = warp::test::request()
            .method("POST")
            .path("/stop_server")
            .json(&serde_json::json!({ "action": "pause" }))
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().as_ref(), b"unrecognized action");
    }

    #[tokio::test]
    async fn test_stop_runs_handler() {
        let stopped = Arc::new(AtomicBool::new(false));
        let (state, _) = state();
        let state = state.with_stop_handler({
            let stopped = Arc::clone(&stopped);
            move || stopped.store(true, Ordering::SeqCst)
        });

        let response = warp::test::request()
            .method("POST")
            .path("/stop_server")
            .json(&serde_json::json!({ "action": "stop" }))
            .reply(&routes(state))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_video_feed_streams_parts() {
        let ledger = Arc::new(PlateLedger::default());
        let (mut feed, frames) = mjpeg_feed();
        let frame = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(90.0)).unwrap();
        feed.publish(&frame).unwrap();
        // Dropping the publisher ends the stream after the latest part.
        drop(feed);

        let response = warp::test::request()
            .path("/video_feed")
            .reply(&routes(ServerState::new(ledger, frames)))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert!(response
            .body()
            .starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::register();
        let (state, _) = state();

        let response = warp::test::request().path("/metrics").reply(&routes(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(String::from_utf8_lossy(response.body()).contains("plate_reports_total"));
    }
}
