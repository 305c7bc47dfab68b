//! Configuration management for the camera server

use serde::{Deserialize, Serialize};
use std::net::UdpSocket;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,
}

/// Camera capture configuration, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Camera index (`/dev/video<N>` on Linux)
    #[serde(default)]
    pub device_index: u32,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Target capture rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Text burnt in before the timestamp at the top of each frame
    #[serde(default = "default_label")]
    pub label: String,

    /// Status caption burnt in at the bottom of each frame
    #[serde(default = "default_caption")]
    pub caption: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            label: default_label(),
            caption: default_caption(),
        }
    }
}

impl CaptureConfig {
    /// Capture period derived from the target rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64)
    }

    /// "<W>x<H>"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-connection delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// JPEG quality for the continuous stream (1-100)
    #[serde(default = "default_stream_quality")]
    pub stream_quality: u8,

    /// JPEG quality for single snapshots (1-100)
    #[serde(default = "default_snapshot_quality")]
    pub snapshot_quality: u8,

    /// Minimum delay between two parts of one stream
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_quality: default_stream_quality(),
            snapshot_quality: default_snapshot_quality(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl StreamConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

// Default value functions
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_label() -> String {
    "DemCare Camera".to_string()
}
fn default_caption() -> String {
    "Patient Monitoring Active".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_stream_quality() -> u8 {
    85
}
fn default_snapshot_quality() -> u8 {
    100
}
fn default_pacing_ms() -> u64 {
    33
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cap = &self.capture;

        if cap.width == 0 || cap.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture: width and height must be > 0, got {}",
                cap.resolution()
            )));
        }

        if cap.fps == 0 || cap.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "capture: fps must be between 1 and 120, got {}",
                cap.fps
            )));
        }

        let stream = &self.stream;
        for (name, quality) in [
            ("stream_quality", stream.stream_quality),
            ("snapshot_quality", stream.snapshot_quality),
        ] {
            if quality == 0 || quality > 100 {
                return Err(ConfigError::Invalid(format!(
                    "stream: {} must be between 1 and 100, got {}",
                    name, quality
                )));
            }
        }

        if stream.pacing_ms == 0 || stream.pacing_ms > 1000 {
            return Err(ConfigError::Invalid(format!(
                "stream: pacing_ms must be between 1 and 1000, got {}",
                stream.pacing_ms
            )));
        }

        Ok(())
    }

    /// Listener address as "<host>:<port>"
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Resolves the outbound-routable local IP by "connecting" a UDP socket.
///
/// No packet is sent. Falls back to loopback when there is no route.
pub fn local_ip() -> String {
    fn probe() -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip().to_string())
    }

    probe().unwrap_or_else(|| "127.0.0.1".to_string())
}
