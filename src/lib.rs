//! HTTP MJPEG camera server
//!
//! One capture loop reads a camera at a fixed rate and publishes the latest
//! frame into a single-slot [`SharedFrameBuffer`]. Any number of HTTP
//! clients stream that frame as `multipart/x-mixed-replace` JPEG parts, each
//! at its own pace, or fetch one-shot snapshots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ip_camera_streamer::{CaptureConfig, CaptureLoop, CaptionOverlay, SharedFrameBuffer, TestPattern};
//!
//! let config = CaptureConfig::default();
//! let buffer = Arc::new(SharedFrameBuffer::new());
//! let overlay = Arc::new(CaptionOverlay::from_config(&config));
//! let capture = CaptureLoop::new(config, Arc::clone(&buffer), overlay);
//! capture.start(&TestPattern).expect("test pattern always opens");
//! // ... serve `buffer` to clients
//! capture.stop();
//! ```

pub mod buffer;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod frame;
pub mod status;
pub mod streamer;
pub mod web;

// Re-exports for convenience
pub use buffer::SharedFrameBuffer;
pub use capture::{
    CaptionOverlay, CaptureError, CaptureLoop, CaptureState, CaptureStats, FrameSource,
    NoOverlay, Overlay, SourceOpener, TestPattern,
};
pub use config::{CaptureConfig, Config, ConfigError, ServerConfig, StreamConfig};
pub use encoder::{EncodeError, EncodedFrame, StreamEncoder};
pub use frame::Frame;
pub use status::{StatusReport, StatusReporter};
pub use streamer::{MultipartStreamer, StreamSession, StreamerStats};
