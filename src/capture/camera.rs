//! GStreamer camera backend
//!
//! Raw RGB frames are pulled synchronously from an `appsink` at the end of a
//! platform-specific source pipeline.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info};

use super::{CaptureError, FrameSource, SourceOpener};
use crate::config::CaptureConfig;
use crate::frame::{Frame, BYTES_PER_PIXEL};

/// How long a single read may wait for the device.
const PULL_TIMEOUT_MS: u64 = 1000;

/// Opener for [`Camera`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GstCamera;

impl SourceOpener for GstCamera {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(Camera::new(config)?))
    }
}

/// Camera device behind a GStreamer pipeline.
pub struct Camera {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    width: u32,
    height: u32,
}

impl Camera {
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        gst::init().map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let description = pipeline_description(config);
        debug!(pipeline = %description, "Creating GStreamer pipeline");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| CaptureError::Pipeline(format!("{}: {}", description, e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Pipeline("Parsed element is not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Pipeline("Element 'sink' not found".to_string()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::Pipeline("Element 'sink' is not an appsink".to_string()))?;

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gst::State::Null);
            CaptureError::DeviceUnavailable(format!(
                "cannot open camera {}: {:?}",
                config.device_index, e
            ))
        })?;

        // Surface a missing device now rather than on the first read.
        let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(5));
        if result.is_err() {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CaptureError::DeviceUnavailable(format!(
                "cannot open camera {}",
                config.device_index
            )));
        }

        info!(device = config.device_index, "Camera pipeline playing");

        Ok(Camera {
            pipeline,
            appsink,
            width: config.width,
            height: config.height,
        })
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
            .ok_or_else(|| CaptureError::ReadFailed("no sample from appsink".to_string()))?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| CaptureError::ReadFailed("sample had no buffer".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CaptureError::ReadFailed("unable to map buffer".to_string()))?;

        // GStreamer pads RGB rows to a multiple of four bytes.
        let row = self.width as usize * BYTES_PER_PIXEL;
        let stride = (row + 3) & !3;
        let rows = self.height as usize;
        let src = map.as_slice();
        if src.len() < stride * rows.saturating_sub(1) + row {
            return Err(CaptureError::ReadFailed(format!(
                "short buffer: {} bytes",
                src.len()
            )));
        }

        let mut data = Vec::with_capacity(row * rows);
        for y in 0..rows {
            data.extend_from_slice(&src[y * stride..y * stride + row]);
        }

        Ok(Frame::new(self.width, self.height, data))
    }

    fn close(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        debug!("Camera pipeline released");
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn pipeline_description(config: &CaptureConfig) -> String {
    let source = if cfg!(target_os = "macos") {
        format!("avfvideosrc device-index={}", config.device_index)
    } else {
        format!("v4l2src device=/dev/video{}", config.device_index)
    };

    format!(
        "{source} ! videoconvert ! videoscale ! videorate ! \
         video/x-raw,format=RGB,width={w},height={h},framerate={fps}/1 ! \
         appsink name=sink max-buffers=2 drop=true sync=false",
        source = source,
        w = config.width,
        h = config.height,
        fps = config.fps,
    )
}
