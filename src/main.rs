//! qrfeed service entrypoint

#[cfg(not(any(feature = "camera", feature = "simulator")))]
compile_error!("qrfeed needs the `camera` or `simulator` feature");

use anyhow::Context;
use clap::Parser;
use qrfeed::api::{self, AppState};
use qrfeed::camera::{self, CameraController};
use qrfeed::config::MetricsFormat;
use qrfeed::service::CameraService;
use qrfeed::{QrfeedConfig, logging, metrics};
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "qrfeed",
    version,
    about = "Webcam QR scanner with an MJPEG preview and a polling API"
)]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to qrfeed.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to [default: 0.0.0.0]
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,

    /// Port for the HTTP server [default: 5005]
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Camera index opened at startup (/dev/videoN) [default: 0]
    #[arg(long, value_name = "INDEX")]
    camera: Option<usize>,

    /// List detected cameras and exit
    #[arg(long)]
    list_cameras: bool,

    /// Log a metrics summary periodically
    #[arg(long)]
    metrics: bool,

    /// Format served by /metrics (`json` or `prometheus`)
    #[arg(long, value_name = "FORMAT")]
    metrics_format: Option<MetricsFormat>,

    /// Replay still images from a directory instead of using a live camera
    #[cfg(feature = "simulator")]
    #[arg(long, value_name = "DIR")]
    simulator: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = QrfeedConfig::load(cli.config.as_deref())?;
    apply_cli(&cli, &mut config);

    logging::init(&config.logging)?;

    if cli.list_cameras {
        list_cameras(config.camera.probe_count);
        return Ok(());
    }

    if let Err(err) = run(config).await {
        error!(error = %format!("{err:#}"), "qrfeed failed to start");
        return Err(err);
    }
    Ok(())
}

fn apply_cli(cli: &Cli, config: &mut QrfeedConfig) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(index) = cli.camera {
        config.camera.index = index;
    }
    if cli.metrics {
        config.logging.metrics = true;
    }
    if let Some(format) = cli.metrics_format {
        config.logging.metrics_format = format;
    }

    #[cfg(feature = "simulator")]
    if let Some(dir) = &cli.simulator {
        config.camera.simulator_dir = Some(dir.clone());
    }
}

async fn run(config: QrfeedConfig) -> anyhow::Result<()> {
    if config.logging.metrics {
        metrics::enable(config.logging.metrics_interval_secs);
    }

    let camera_settings = config.camera_settings()?;
    let stream_settings = config.stream_settings()?;
    let backends = camera::build_backends(&camera_settings)?;
    info!(
        backends = ?backends.iter().map(|b| b.name().to_string()).collect::<Vec<_>>(),
        resolution = %camera_settings.resolution,
        fps = camera_settings.fps,
        "Camera backends ready"
    );

    let preferred = camera_settings.index;
    let controller = CameraController::new(backends, camera_settings);
    let service = Arc::new(CameraService::new(controller, stream_settings));

    match service.startup(preferred).await {
        Some(index) => info!(index, "Camera active"),
        None => info!("Waiting for POST /start_camera"),
    }

    let state = AppState::new(Arc::clone(&service)).with_metrics_format(config.logging.metrics_format);
    let app = api::router(state, &config.server);

    let addr = config.server.socket_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "qrfeed listening");

    // Open MJPEG responses never finish on their own, so shut down without draining them
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served.context("HTTP server error")?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    service.stop().await?;
    info!("Camera released, bye");
    Ok(())
}

#[cfg(feature = "camera")]
fn list_cameras(limit: usize) {
    let devices = camera::v4l2::list_devices(limit.max(10));
    if devices.is_empty() {
        println!("No V4L2 cameras detected");
        return;
    }

    println!("Discovered cameras:");
    for dev in devices {
        println!("  [{}] {} ({}, driver {})", dev.index, dev.name, dev.path, dev.driver);
    }
}

#[cfg(not(feature = "camera"))]
fn list_cameras(_limit: usize) {
    println!("V4L2 support not compiled in (enable the `camera` feature)");
}
