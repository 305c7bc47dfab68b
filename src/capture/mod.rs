//! Periodic capture loop feeding the shared frame buffer

#[cfg(feature = "gstreamer")]
mod camera;
pub mod overlay;
pub mod source;

#[cfg(feature = "gstreamer")]
pub use camera::{Camera, GstCamera};
pub use overlay::{CaptionOverlay, NoOverlay, Overlay};
pub use source::{FrameSource, SourceOpener, TestPattern, TestPatternSource};

use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::buffer::SharedFrameBuffer;
use crate::config::CaptureConfig;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("frame read failed: {0}")]
    ReadFailed(String),

    #[error("capture already running")]
    AlreadyRunning,

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Lifecycle of a [`CaptureLoop`]: `Stopped -> Starting -> Running -> Stopped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    #[default]
    Stopped,
    Starting,
    Running,
}

impl CaptureState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CaptureState::Starting,
            2 => CaptureState::Running,
            _ => CaptureState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CaptureState::Stopped => 0,
            CaptureState::Starting => 1,
            CaptureState::Running => 2,
        }
    }
}

/// Statistics for capture
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureStats {
    pub state: CaptureState,
    pub frames_captured: u64,
    pub failed_reads: u64,
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<Box<dyn FrameSource>>,
}

/// Owns the frame source and drives it on a dedicated thread at the
/// configured rate, publishing every successful read into the buffer.
pub struct CaptureLoop {
    config: CaptureConfig,
    buffer: Arc<SharedFrameBuffer>,
    overlay: Arc<dyn Overlay>,

    state: Arc<AtomicU8>,
    // Serializes start/stop; holds the running thread.
    worker: Mutex<Option<Worker>>,

    frames_captured: Arc<AtomicU64>,
    failed_reads: Arc<AtomicU64>,
}

impl CaptureLoop {
    pub fn new(
        config: CaptureConfig,
        buffer: Arc<SharedFrameBuffer>,
        overlay: Arc<dyn Overlay>,
    ) -> Self {
        Self {
            config,
            buffer,
            overlay,
            state: Arc::new(AtomicU8::new(CaptureState::Stopped.as_u8())),
            worker: Mutex::new(None),
            frames_captured: Arc::new(AtomicU64::new(0)),
            failed_reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens the source and spawns the capture thread.
    ///
    /// On failure the loop stays `Stopped` and nothing is spawned.
    pub fn start(&self, opener: &dyn SourceOpener) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        info!(
            device = self.config.device_index,
            resolution = %self.config.resolution(),
            fps = self.config.fps,
            "Starting capture"
        );
        self.set_state(CaptureState::Starting);

        let source = match opener.open(&self.config) {
            Ok(source) => source,
            Err(e) => {
                self.set_state(CaptureState::Stopped);
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let task = CaptureTask {
            period: self.config.frame_period(),
            buffer: Arc::clone(&self.buffer),
            overlay: Arc::clone(&self.overlay),
            frames_captured: Arc::clone(&self.frames_captured),
            failed_reads: Arc::clone(&self.failed_reads),
        };

        // Running before the thread starts so the loop never observes Starting.
        self.set_state(CaptureState::Running);
        let spawned = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || task.run(source, stop_rx));

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { stop_tx, handle });
                info!("Capture started");
                Ok(())
            }
            Err(e) => {
                self.set_state(CaptureState::Stopped);
                Err(CaptureError::Spawn(e))
            }
        }
    }

    /// Signals the capture thread, waits for it and releases the source.
    ///
    /// Idempotent; callable from any thread.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(Worker { stop_tx, handle }) = worker.take() else {
            return;
        };

        info!("Stopping capture");
        self.set_state(CaptureState::Stopped);
        let _ = stop_tx.send(());

        match handle.join() {
            Ok(mut source) => source.close(),
            Err(_) => error!("Capture thread panicked"),
        }

        let stats = self.stats();
        info!(
            frames = stats.frames_captured,
            failed_reads = stats.failed_reads,
            "Capture stopped"
        );
    }

    pub fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<SharedFrameBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            state: self.state(),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            failed_reads: self.failed_reads.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: CaptureState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the capture thread
struct CaptureTask {
    period: std::time::Duration,
    buffer: Arc<SharedFrameBuffer>,
    overlay: Arc<dyn Overlay>,
    frames_captured: Arc<AtomicU64>,
    failed_reads: Arc<AtomicU64>,
}

impl CaptureTask {
    fn run(
        self,
        mut source: Box<dyn FrameSource>,
        stop_rx: mpsc::Receiver<()>,
    ) -> Box<dyn FrameSource> {
        debug!(period_ms = self.period.as_millis() as u64, "Capture thread started");

        let mut next_tick = Instant::now();
        let mut consecutive_failures = 0u64;

        loop {
            match source.read() {
                Ok(mut frame) => {
                    if consecutive_failures > 0 {
                        info!(failures = consecutive_failures, "Frame capture recovered");
                        consecutive_failures = 0;
                    }
                    self.overlay.apply(&mut frame, Local::now());
                    let sequence = self.frames_captured.fetch_add(1, Ordering::Relaxed) + 1;
                    frame.set_sequence(sequence);
                    self.buffer.publish(frame);
                }
                Err(e) => {
                    self.failed_reads.fetch_add(1, Ordering::Relaxed);
                    if consecutive_failures == 0 {
                        warn!(error = %e, "Frame capture failed, keeping last frame");
                    }
                    consecutive_failures += 1;
                }
            }

            // Sleep to the next period boundary. When behind, restart the
            // schedule from now instead of bursting to catch up.
            next_tick += self.period;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }

            match stop_rx.recv_timeout(next_tick - now) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("Capture thread exiting");
        source
    }
}
