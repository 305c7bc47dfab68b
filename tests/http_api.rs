//! End-to-end HTTP tests against an in-process server

use futures_util::StreamExt;
use ip_camera_streamer::web::{run_server, AppState};
use ip_camera_streamer::{
    CaptionOverlay, CaptureConfig, CaptureError, CaptureLoop, FrameSource, MultipartStreamer,
    SharedFrameBuffer, SourceOpener, StreamConfig, TestPattern,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

/// Helper struct to manage an in-process test server
struct TestServer {
    base: String,
    capture: Arc<CaptureLoop>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(opener: &dyn SourceOpener) -> Self {
        let capture_config = CaptureConfig {
            width: WIDTH,
            height: HEIGHT,
            fps: 30,
            ..Default::default()
        };
        let stream_config = StreamConfig::default();

        let buffer = Arc::new(SharedFrameBuffer::new());
        let overlay = Arc::new(CaptionOverlay::from_config(&capture_config));
        let capture = Arc::new(CaptureLoop::new(capture_config, Arc::clone(&buffer), overlay));
        capture.start(opener).expect("capture should start");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let streamer = Arc::new(MultipartStreamer::new(buffer, &stream_config, shutdown_rx));
        let state = AppState::new(Arc::clone(&capture), streamer, &stream_config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let shutdown = async move {
            let _ = stop_rx.await;
            let _ = shutdown_tx.send(true);
        };
        let handle = tokio::spawn(run_server(listener, state, shutdown));

        TestServer {
            base,
            capture,
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn wait_for_frame(&self) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.capture.buffer().is_empty() {
            assert!(Instant::now() < deadline, "no frame was captured");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let result = timeout(Duration::from_secs(3), &mut self.handle)
            .await
            .expect("server did not drain")
            .expect("server task panicked");

        let capture = Arc::clone(&self.capture);
        tokio::task::spawn_blocking(move || capture.stop()).await.unwrap();
        result
    }
}

fn never_reads() -> impl SourceOpener {
    struct Stalled;
    impl FrameSource for Stalled {
        fn read(&mut self) -> Result<ip_camera_streamer::Frame, CaptureError> {
            Err(CaptureError::ReadFailed("device stalled".into()))
        }
    }

    |_: &CaptureConfig| -> Result<Box<dyn FrameSource>, CaptureError> { Ok(Box::new(Stalled)) }
}

/// Pulls complete multipart parts out of an accumulating byte buffer.
fn take_parts(pending: &mut Vec<u8>) -> Vec<Vec<u8>> {
    const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut parts = Vec::new();

    loop {
        assert!(
            pending.len() < HEADER.len() || pending.starts_with(HEADER),
            "stream out of sync"
        );
        // Payload runs until the next part header (or is incomplete).
        let Some(next) = pending[HEADER.len().min(pending.len())..]
            .windows(HEADER.len())
            .position(|w| w == HEADER)
        else {
            break;
        };
        let end = HEADER.len() + next;
        let part: Vec<u8> = pending.drain(..end).collect();
        parts.push(part);
    }
    parts
}

#[tokio::test]
async fn test_status_reports_active_capture() {
    let server = TestServer::start(&TestPattern).await;

    let body: Value = reqwest::get(server.url("/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "active");
    assert_eq!(body["resolution"], "160x120");
    assert_eq!(body["fps"], 30);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_is_decodable_at_configured_size() {
    let server = TestServer::start(&TestPattern).await;
    server.wait_for_frame().await;

    let resp = reqwest::get(server.url("/api/snapshot")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");

    let bytes = resp.bytes().await.unwrap();
    let image = image::load_from_memory(&bytes).unwrap();
    assert_eq!((image.width(), image.height()), (WIDTH, HEIGHT));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_not_found_without_frames() {
    let server = TestServer::start(&never_reads()).await;
    sleep(Duration::from_millis(100)).await;

    let resp = reqwest::get(server.url("/api/snapshot")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(resp.text().await.unwrap(), "No frame available");

    // Capture failures are not fatal: the loop is still running.
    let body: Value = reqwest::get(server.url("/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "active");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_video_stream_parts() {
    let server = TestServer::start(&TestPattern).await;
    server.wait_for_frame().await;

    let resp = reqwest::get(server.url("/video")).await.unwrap();
    assert_eq!(
        resp.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut stream = resp.bytes_stream();
    let mut pending = Vec::new();
    let mut parts = Vec::new();
    while parts.len() < 3 {
        let chunk = timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("stream stalled")
            .expect("stream ended")
            .unwrap();
        pending.extend_from_slice(&chunk);
        parts.extend(take_parts(&mut pending));
    }

    for part in &parts {
        let payload = &part[b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".len()..part.len() - 2];
        assert!(part.ends_with(b"\r\n"));
        let image = image::load_from_memory(payload).unwrap();
        assert_eq!((image.width(), image.height()), (WIDTH, HEIGHT));
    }

    drop(stream);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let server = TestServer::start(&TestPattern).await;
    server.wait_for_frame().await;

    let resp = reqwest::get(server.url("/video")).await.unwrap();
    let mut stream = resp.bytes_stream();
    assert!(stream.next().await.is_some());

    let reader = tokio::spawn(async move { while let Some(Ok(_)) = stream.next().await {} });

    server.shutdown().await.unwrap();
    timeout(Duration::from_secs(2), reader)
        .await
        .expect("client stream did not end")
        .unwrap();
}

#[tokio::test]
async fn test_clients_disconnect_independently() {
    let server = TestServer::start(&TestPattern).await;
    server.wait_for_frame().await;

    let first = reqwest::get(server.url("/video")).await.unwrap();
    let second = reqwest::get(server.url("/video")).await.unwrap();
    drop(first);

    let mut stream = second.bytes_stream();
    for _ in 0..3 {
        let chunk = timeout(Duration::from_secs(2), stream.next()).await.unwrap();
        assert!(chunk.is_some());
    }

    drop(stream);
    server.shutdown().await.unwrap();
}
