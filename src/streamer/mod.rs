//! Per-connection MJPEG delivery over `multipart/x-mixed-replace`
//!
//! Every HTTP client gets its own [`StreamSession`]. A session polls the
//! shared buffer at a fixed pacing interval, encodes whatever frame is
//! current and emits it as one multipart part. Sessions never talk to each
//! other or to the capture loop; they only read the buffer.

mod stats;

pub use stats::StreamerStats;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::buffer::SharedFrameBuffer;
use crate::config::StreamConfig;
use crate::encoder::{EncodedFrame, StreamEncoder};
use stats::StreamerCounters;

/// Boundary token separating parts.
pub const BOUNDARY: &str = "frame";

/// `Content-Type` of a stream response; must agree with [`BOUNDARY`].
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Default delay between parts (a soft ~30 fps cap per connection).
pub const DEFAULT_PACING: Duration = Duration::from_millis(33);

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Frames one JPEG as a multipart part:
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    part.put_slice(PART_HEADER);
    part.put_slice(jpeg);
    part.put_slice(PART_TRAILER);
    part.freeze()
}

/// Creates stream sessions that share one buffer, one shutdown signal and
/// one set of counters.
pub struct MultipartStreamer {
    buffer: Arc<SharedFrameBuffer>,
    encoder: StreamEncoder,
    quality: u8,
    pacing: Duration,
    shutdown: watch::Receiver<bool>,
    counters: Arc<StreamerCounters>,
    next_session_id: AtomicU64,
}

impl MultipartStreamer {
    pub fn new(
        buffer: Arc<SharedFrameBuffer>,
        config: &StreamConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            buffer,
            encoder: StreamEncoder::new(),
            quality: config.stream_quality,
            pacing: config.pacing(),
            shutdown,
            counters: Arc::new(StreamerCounters::default()),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Opens a session for one client connection.
    pub fn session(&self) -> StreamSession {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.counters.sessions_total.fetch_add(1, Ordering::Relaxed);
        let active = self.counters.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        info!(session = id, active, "Stream session opened");

        StreamSession {
            id,
            buffer: Arc::clone(&self.buffer),
            encoder: self.encoder,
            quality: self.quality,
            pacing: self.pacing,
            shutdown: self.shutdown.clone(),
            counters: Arc::clone(&self.counters),
            last: None,
            started: false,
            parts_sent: 0,
        }
    }

    pub fn stats(&self) -> StreamerStats {
        self.counters.snapshot()
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }
}

/// State of one streaming connection.
///
/// Dropping the session (the transport dropping the response body on
/// disconnect) ends it; so does the server-wide shutdown signal, observed at
/// every pacing point.
pub struct StreamSession {
    id: u64,
    buffer: Arc<SharedFrameBuffer>,
    encoder: StreamEncoder,
    quality: u8,
    pacing: Duration,
    shutdown: watch::Receiver<bool>,
    counters: Arc<StreamerCounters>,
    // Reused while the buffer still holds the same frame.
    last: Option<EncodedFrame>,
    started: bool,
    parts_sent: u64,
}

impl StreamSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parts_sent(&self) -> u64 {
        self.parts_sent
    }

    /// Waits for the next frame to emit, or `None` once shutdown is signalled.
    ///
    /// Empty buffer and unencodable frames are skipped ticks, not errors.
    pub async fn next_frame(&mut self) -> Option<EncodedFrame> {
        loop {
            if self.started && !self.pace().await {
                return None;
            }
            self.started = true;

            if *self.shutdown.borrow() {
                return None;
            }

            let Some(frame) = self.buffer.read_snapshot() else {
                continue;
            };

            if let Some(last) = &self.last {
                if last.sequence == frame.sequence() {
                    return Some(last.clone());
                }
            }

            let encoder = self.encoder;
            let quality = self.quality;
            match tokio::task::spawn_blocking(move || encoder.encode(&frame, quality)).await {
                Ok(Ok(encoded)) => {
                    self.last = Some(encoded.clone());
                    return Some(encoded);
                }
                Ok(Err(e)) => {
                    self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(session = self.id, error = %e, "Skipping frame");
                }
                Err(e) => {
                    self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(session = self.id, error = %e, "Encode task failed");
                }
            }
        }
    }

    /// Waits for the next frame and frames it as a multipart part.
    pub async fn next_part(&mut self) -> Option<Bytes> {
        let frame = self.next_frame().await?;
        let part = multipart_part(&frame.jpeg);

        self.parts_sent += 1;
        self.counters.parts_sent.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_sent
            .fetch_add(frame.jpeg.len() as u64, Ordering::Relaxed);

        Some(part)
    }

    /// Turns the session into a response body stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream::unfold(self, |mut session| async move {
            let part = session.next_part().await?;
            Some((Ok(part), session))
        })
    }

    /// Sleeps one pacing interval. Returns false if shutdown was signalled.
    async fn pace(&mut self) -> bool {
        let pacing = self.pacing;
        tokio::select! {
            _ = tokio::time::sleep(pacing) => return true,
            changed = self.shutdown.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() {
                    return false;
                }
            }
        }
        !*self.shutdown.borrow()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let active = self
            .counters
            .active_sessions
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        info!(
            session = self.id,
            parts = self.parts_sent,
            active,
            "Stream session closed"
        );
    }
}
