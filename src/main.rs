//! IP camera server CLI application

use anyhow::{Context, Result};
use clap::Parser;
use ip_camera_streamer::config::{local_ip, Config};
use ip_camera_streamer::web::{run_server, AppState};
use ip_camera_streamer::{
    CaptionOverlay, CaptureLoop, MultipartStreamer, SharedFrameBuffer, SourceOpener, TestPattern,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "ip-camera-streamer")]
#[command(about = "Serve a camera as an HTTP MJPEG stream")]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera index (default: 0). Opening a camera needs a build with the
    /// `gstreamer` feature; other builds must run with --test-pattern
    #[arg(long)]
    camera: Option<u32>,

    /// Frame width (default: 640)
    #[arg(long)]
    width: Option<u32>,

    /// Frame height (default: 480)
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second (default: 30)
    #[arg(long)]
    fps: Option<u32>,

    /// Server host (default: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Server port (default: 5000)
    #[arg(long)]
    port: Option<u16>,

    /// JPEG quality of the continuous stream (default: 85)
    #[arg(long)]
    stream_quality: Option<u8>,

    /// JPEG quality of snapshots (default: 100)
    #[arg(long)]
    snapshot_quality: Option<u8>,

    /// Serve a synthetic test pattern instead of a camera
    #[arg(long)]
    test_pattern: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Command-line values win over the configuration file.
    fn apply(&self, config: &mut Config) {
        if let Some(camera) = self.camera {
            config.capture.device_index = camera;
        }
        if let Some(width) = self.width {
            config.capture.width = width;
        }
        if let Some(height) = self.height {
            config.capture.height = height;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(quality) = self.stream_quality {
            config.stream.stream_quality = quality;
        }
        if let Some(quality) = self.snapshot_quality {
            config.stream.snapshot_quality = quality;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    // Capture first: without a camera there is nothing to serve.
    let buffer = Arc::new(SharedFrameBuffer::new());
    let overlay = Arc::new(CaptionOverlay::from_config(&config.capture));
    let capture = Arc::new(CaptureLoop::new(
        config.capture.clone(),
        Arc::clone(&buffer),
        overlay,
    ));

    let opener = source_opener(cli.test_pattern);
    if let Err(e) = capture.start(opener.as_ref()) {
        error!(camera = config.capture.device_index, error = %e, "Failed to start camera server");
        return Err(e.into());
    }

    let listener = match TcpListener::bind(config.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            stop_capture(&capture).await;
            return Err(e).with_context(|| format!("binding {}", config.bind_addr()));
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let streamer = Arc::new(MultipartStreamer::new(
        Arc::clone(&buffer),
        &config.stream,
        shutdown_rx,
    ));
    let state = AppState::new(Arc::clone(&capture), Arc::clone(&streamer), &config.stream);

    log_banner(&local_ip(), config.server.port);

    let stats_task = tokio::spawn(log_stats(Arc::clone(&capture), Arc::clone(&streamer)));

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutting down camera server");
        let _ = shutdown_tx.send(true);
    };

    let served = run_server(listener, state, shutdown).await;

    stats_task.abort();
    stop_capture(&capture).await;
    info!("Camera server stopped");

    served
}

#[cfg(feature = "gstreamer")]
fn camera_opener() -> Box<dyn SourceOpener> {
    Box::new(ip_camera_streamer::capture::GstCamera)
}

#[cfg(not(feature = "gstreamer"))]
fn camera_opener() -> Box<dyn SourceOpener> {
    use ip_camera_streamer::{CaptureConfig, CaptureError, FrameSource};

    Box::new(
        |config: &CaptureConfig| -> Result<Box<dyn FrameSource>, CaptureError> {
            Err(CaptureError::DeviceUnavailable(format!(
                "cannot open camera {}: built without the `gstreamer` feature (use --test-pattern)",
                config.device_index
            )))
        },
    )
}

fn source_opener(test_pattern: bool) -> Box<dyn SourceOpener> {
    if test_pattern {
        info!("Using synthetic test pattern");
        Box::new(TestPattern)
    } else {
        camera_opener()
    }
}

/// Joins the capture thread off the async runtime.
async fn stop_capture(capture: &Arc<CaptureLoop>) {
    let capture = Arc::clone(capture);
    if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
        error!(error = %e, "Failed to stop capture");
    }
}

fn log_banner(ip: &str, port: u16) {
    let base = format!("http://{}:{}", ip, port);
    info!("DemCare IP Camera Server started");
    info!(url = %format!("{}/mobile", base), "Mobile app URL");
    info!(url = %format!("{}/video", base), "Direct stream");
    info!(url = %base, "Web interface");
    info!(url = %format!("{}/api/status", base), "Status API");
    info!(url = %format!("{}/api/snapshot", base), "Snapshot API");
    info!("Press Ctrl+C to stop the server");
}

async fn log_stats(capture: Arc<CaptureLoop>, streamer: Arc<MultipartStreamer>) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await;

    let mut previous = streamer.stats();
    let mut last = Instant::now();

    loop {
        interval.tick().await;

        let elapsed = last.elapsed().as_secs_f64().max(f64::EPSILON);
        let current = streamer.stats();
        let window = current.since(&previous);
        let capture_stats = capture.stats();

        info!(
            captured = capture_stats.frames_captured,
            failed_reads = capture_stats.failed_reads,
            clients = current.active_sessions,
            new_clients = window.sessions_total,
            parts_per_sec = %format!("{:.1}", window.parts_sent as f64 / elapsed),
            kbps = %format!("{:.0}", window.bytes_sent as f64 * 8.0 / elapsed / 1000.0),
            "Stats"
        );

        previous = current;
        last = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["ip-camera-streamer"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "ip-camera-streamer",
            "--camera",
            "1",
            "--width",
            "1280",
            "--height",
            "720",
            "--fps",
            "15",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--stream-quality",
            "60",
            "--test-pattern",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.capture.device_index, 1);
        assert_eq!(config.capture.resolution(), "1280x720");
        assert_eq!(config.capture.fps, 15);
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.stream.stream_quality, 60);
        assert_eq!(config.stream.snapshot_quality, 100);
        assert!(cli.test_pattern);
    }

    #[test]
    fn test_camera_help_names_build_requirement() {
        use clap::CommandFactory;
        let command = Cli::command();
        let camera = command
            .get_arguments()
            .find(|arg| arg.get_id() == "camera")
            .unwrap();
        let help = camera.get_long_help().or(camera.get_help()).unwrap().to_string();
        assert!(help.contains("gstreamer"));
        assert!(help.contains("--test-pattern"));
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
