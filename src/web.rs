//! HTTP surface: pages, MJPEG stream, snapshot and status APIs

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::buffer::SharedFrameBuffer;
use crate::capture::{CaptureLoop, CaptureStats};
use crate::config::StreamConfig;
use crate::encoder::StreamEncoder;
use crate::status::{StatusReport, StatusReporter};
use crate::streamer::{MultipartStreamer, StreamerStats, STREAM_CONTENT_TYPE};

const INDEX_HTML: &str = include_str!("../web/index.html");
const MOBILE_HTML: &str = include_str!("../web/mobile.html");
const HOST_PLACEHOLDER: &str = "STREAM_HOST_PLACEHOLDER";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const NO_FRAME: &str = "No frame available";

/// Web server state
#[derive(Clone)]
pub struct AppState {
    capture: Arc<CaptureLoop>,
    buffer: Arc<SharedFrameBuffer>,
    streamer: Arc<MultipartStreamer>,
    reporter: StatusReporter,
    encoder: StreamEncoder,
    snapshot_quality: u8,
}

impl AppState {
    pub fn new(
        capture: Arc<CaptureLoop>,
        streamer: Arc<MultipartStreamer>,
        stream_config: &StreamConfig,
    ) -> Self {
        Self {
            buffer: Arc::clone(capture.buffer()),
            reporter: StatusReporter::new(Arc::clone(&capture)),
            capture,
            streamer,
            encoder: StreamEncoder::new(),
            snapshot_quality: stream_config.snapshot_quality,
        }
    }
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/video", get(video_handler))
        .route("/mobile", get(mobile_handler))
        .route("/api/status", get(status_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router until `shutdown` resolves.
///
/// Streaming responses end on their own once the streamer's shutdown signal
/// fires, which lets the graceful drain finish.
pub async fn run_server<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Web server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Web server stopped");
    Ok(())
}

/// Index page handler
async fn index_handler(headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    Html(INDEX_HTML.replace(HOST_PLACEHOLDER, &escape_html(host)))
}

/// Escapes text for use inside HTML element content and quoted attributes.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Mobile page handler
async fn mobile_handler() -> Html<&'static str> {
    Html(MOBILE_HTML)
}

/// MJPEG stream handler; one session per request
async fn video_handler(State(state): State<AppState>) -> Response {
    let session = state.streamer.session();

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, NO_CACHE),
        ],
        Body::from_stream(session.into_stream()),
    )
        .into_response()
}

/// Status API handler
async fn status_handler(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.reporter.status())
}

/// Snapshot API handler
async fn snapshot_handler(State(state): State<AppState>) -> Response {
    let Some(frame) = state.buffer.read_snapshot() else {
        return (StatusCode::NOT_FOUND, NO_FRAME).into_response();
    };

    let encoder = state.encoder;
    let quality = state.snapshot_quality;
    match tokio::task::spawn_blocking(move || encoder.encode(&frame, quality)).await {
        Ok(Ok(encoded)) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, NO_CACHE),
            ],
            encoded.jpeg,
        )
            .into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "Snapshot frame could not be encoded");
            (StatusCode::NOT_FOUND, NO_FRAME).into_response()
        }
        Err(e) => {
            error!(error = %e, "Snapshot encode task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Stats API response
#[derive(Serialize)]
struct StatsResponse {
    capture: CaptureStats,
    streaming: StreamerStats,
    frames_published: u64,
}

/// Stats API handler
async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        capture: state.capture.stats(),
        streaming: state.streamer.stats(),
        frames_published: state.buffer.published_count(),
    })
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
