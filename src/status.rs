//! Read-only run state for the status API

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capture::CaptureLoop;

/// Body of `GET /api/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// "active" while the capture loop runs, "inactive" otherwise
    pub status: String,
    /// "<W>x<H>"
    pub resolution: String,
    pub fps: u32,
    /// Local time, "%Y-%m-%d %H:%M:%S"
    pub timestamp: String,
}

#[derive(Clone)]
pub struct StatusReporter {
    capture: Arc<CaptureLoop>,
}

impl StatusReporter {
    pub fn new(capture: Arc<CaptureLoop>) -> Self {
        Self { capture }
    }

    pub fn status(&self) -> StatusReport {
        let config = self.capture.config();
        let status = if self.capture.is_running() {
            "active"
        } else {
            "inactive"
        };

        StatusReport {
            status: status.to_string(),
            resolution: config.resolution(),
            fps: config.fps,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}
