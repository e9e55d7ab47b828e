//! Runtime configuration for the qrfeed service
//!
//! Values come from a TOML/YAML file (explicit or discovered), then `QRFEED_*`
//! environment variables, then command-line flags applied by the binary.

use crate::camera::{CameraSettings, Resolution};
use crate::error::{Error, Result};
use crate::stream::StreamSettings;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QrfeedConfig {
    /// Camera selection and capture parameters
    pub camera: CameraOptions,
    /// HTTP server binding
    pub server: ServerOptions,
    /// MJPEG stream behaviour
    pub stream: StreamOptions,
    /// Logging configuration
    pub logging: LoggingOptions,
}

impl QrfeedConfig {
    /// Load configuration from an explicit path or fall back to discovered defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Some(path) = Self::discover_file()? {
            tracing::info!("Using configuration file: {}", path.display());
            Self::from_file(&path)?
        } else {
            tracing::debug!("No qrfeed.toml / qrfeed.yaml found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Attempt to locate a configuration file in common locations.
    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;
        for candidate in ["qrfeed.toml", "qrfeed.yaml", "qrfeed.yml"] {
            let path = cwd.join(candidate);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(xdg_config) = env::var_os("XDG_CONFIG_HOME") {
            let base = PathBuf::from(xdg_config).join("qrfeed");
            for candidate in ["config.toml", "config.yaml"] {
                let path = base.join(candidate);
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }

    /// Read configuration from a concrete file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "toml" => toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse TOML {}: {e}", path.display()))
            }),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse YAML {}: {e}", path.display()))
            }),
            other => Err(Error::Config(format!(
                "Unsupported config format '{other}', expected toml/yaml"
            ))),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.camera.apply_env_overrides();
        self.server.apply_env_overrides();
        self.stream.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Resolved settings for the camera controller
    pub fn camera_settings(&self) -> Result<CameraSettings> {
        self.camera.to_settings()
    }

    /// Resolved settings for the MJPEG stream loop
    pub fn stream_settings(&self) -> Result<StreamSettings> {
        self.stream.to_settings()
    }
}

/// Camera options as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Camera opened at startup (e.g. 2 for `/dev/video2`)
    pub index: usize,
    /// Requested frame width in pixels
    pub width: u32,
    /// Requested frame height in pixels
    pub height: u32,
    /// Requested frames per second
    pub fps: u32,
    /// Number of V4L2 buffers to allocate
    pub buffer_count: u32,
    /// Milliseconds a read may wait for a frame before it counts as failed
    pub read_timeout_ms: u64,
    /// Capture backends in preference order (mjpeg/yuyv/rgb24)
    pub backends: Vec<String>,
    /// Number of indices probed when enumerating cameras
    pub probe_count: usize,
    /// Replay images from this directory instead of opening hardware
    pub simulator_dir: Option<PathBuf>,
}

impl Default for CameraOptions {
    fn default() -> Self {
        let defaults = CameraSettings::default();
        Self {
            index: defaults.index,
            width: defaults.resolution.width,
            height: defaults.resolution.height,
            fps: defaults.fps,
            buffer_count: defaults.buffer_count,
            read_timeout_ms: defaults.read_timeout.as_millis() as u64,
            backends: defaults.backends,
            probe_count: defaults.probe_count,
            simulator_dir: None,
        }
    }
}

impl CameraOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(index) = env_parse("QRFEED_CAMERA_INDEX") {
            self.index = index;
        }
        if let Some(width) = env_parse("QRFEED_CAMERA_WIDTH") {
            self.width = width;
        }
        if let Some(height) = env_parse("QRFEED_CAMERA_HEIGHT") {
            self.height = height;
        }
        if let Some(fps) = env_parse("QRFEED_CAMERA_FPS") {
            self.fps = fps;
        }
        if let Some(buffers) = env_parse("QRFEED_CAMERA_BUFFERS") {
            self.buffer_count = buffers;
        }
        if let Some(timeout) = env_parse("QRFEED_CAMERA_READ_TIMEOUT_MS") {
            self.read_timeout_ms = timeout;
        }
        if let Ok(backends) = env::var("QRFEED_CAMERA_BACKENDS") {
            self.backends = split_list(&backends);
        }
        if let Some(count) = env_parse("QRFEED_CAMERA_PROBE_COUNT") {
            self.probe_count = count;
        }
        if let Ok(dir) = env::var("QRFEED_SIMULATOR_DIR") {
            self.simulator_dir = (!dir.trim().is_empty()).then(|| PathBuf::from(dir));
        }
    }

    /// Validate and convert into controller settings.
    pub fn to_settings(&self) -> Result<CameraSettings> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "Invalid camera resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.backends.is_empty() {
            return Err(Error::Config("camera.backends must not be empty".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(Error::Config("camera.read_timeout_ms must be non-zero".to_string()));
        }

        Ok(CameraSettings {
            index: self.index,
            resolution: Resolution::new(self.width, self.height),
            fps: self.fps.max(1),
            buffer_count: self.buffer_count.max(2),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            backends: self.backends.clone(),
            probe_count: self.probe_count.max(1),
            simulator_dir: self.simulator_dir.clone(),
        })
    }
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Browser origins allowed by CORS; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5005,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("QRFEED_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse("QRFEED_PORT") {
            self.port = port;
        }
        if let Ok(origins) = env::var("QRFEED_ALLOWED_ORIGINS") {
            self.allowed_origins = split_list(&origins);
        }
    }

    /// Socket address helper for binding servers
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// MJPEG stream options as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Consecutive read failures before the camera is given up on
    pub max_consecutive_errors: u32,
    /// Pause after a failed read, in milliseconds
    pub error_backoff_ms: u64,
    /// Interval between "camera not available" frames, in milliseconds
    pub placeholder_interval_ms: u64,
    /// How long a decoded QR payload stays readable, in seconds
    pub freshness_secs: u64,
    /// Width of synthetic frames
    pub placeholder_width: u32,
    /// Height of synthetic frames
    pub placeholder_height: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_consecutive_errors: 5,
            error_backoff_ms: 500,
            placeholder_interval_ms: 1000,
            freshness_secs: 5,
            placeholder_width: 640,
            placeholder_height: 480,
        }
    }
}

impl StreamOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(quality) = env_parse("QRFEED_JPEG_QUALITY") {
            self.jpeg_quality = quality;
        }
        if let Some(max) = env_parse("QRFEED_MAX_CONSECUTIVE_ERRORS") {
            self.max_consecutive_errors = max;
        }
        if let Some(secs) = env_parse("QRFEED_QR_FRESHNESS_SECS") {
            self.freshness_secs = secs;
        }
    }

    /// Validate and convert into stream loop settings.
    pub fn to_settings(&self) -> Result<StreamSettings> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "stream.jpeg_quality must be within 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if self.placeholder_width == 0 || self.placeholder_height == 0 {
            return Err(Error::Config("placeholder size must be non-zero".to_string()));
        }

        Ok(StreamSettings {
            jpeg_quality: self.jpeg_quality,
            max_consecutive_errors: self.max_consecutive_errors.max(1),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
            placeholder_interval: Duration::from_millis(self.placeholder_interval_ms),
            freshness: Duration::from_secs(self.freshness_secs),
            placeholder_size: Resolution::new(self.placeholder_width, self.placeholder_height),
        })
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default log level (overridable via `QRFEED_LOG_LEVEL`)
    pub level: String,
    /// Optional log file path for teeing structured logs
    pub file: Option<PathBuf>,
    /// Force ANSI colors in stdout logging
    pub color: bool,
    /// Optional log rotation strategy applied to `file`
    pub rotation: Option<LogRotation>,
    /// Log a metrics summary periodically
    pub metrics: bool,
    /// Interval in seconds for the periodic metrics summary
    pub metrics_interval_secs: u64,
    /// Output format for `GET /metrics` (`json` or `prometheus`)
    pub metrics_format: MetricsFormat,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            color: true,
            rotation: None,
            metrics: false,
            metrics_interval_secs: 60,
            metrics_format: MetricsFormat::Json,
        }
    }
}

impl LoggingOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("QRFEED_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(file) = env::var("QRFEED_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Ok(color) = env::var("QRFEED_LOG_COLOR") {
            if let Some(flag) = parse_flag(&color) {
                self.color = flag;
            }
        }
        if let Ok(rotation) = env::var("QRFEED_LOG_ROTATION") {
            if let Some(parsed) = LogRotation::from_str(&rotation) {
                self.rotation = Some(parsed);
            }
        }
        if let Ok(metrics) = env::var("QRFEED_LOG_METRICS") {
            if let Some(flag) = parse_flag(&metrics) {
                self.metrics = flag;
            }
        }
        if let Some(interval) = env_parse::<u64>("QRFEED_LOG_METRICS_INTERVAL") {
            self.metrics_interval_secs = interval.max(5);
        }
        if let Ok(format) = env::var("QRFEED_METRICS_FORMAT") {
            if let Ok(parsed) = format.parse::<MetricsFormat>() {
                self.metrics_format = parsed;
            }
        }
    }
}

/// Supported log rotation policies for file sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate log files once per hour
    Hourly,
    /// Rotate log files once per day
    Daily,
}

impl LogRotation {
    fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}

/// Supported serialization formats for the metrics endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// Emit metrics as structured JSON
    Json,
    /// Emit metrics in Prometheus text exposition format
    Prometheus,
}

impl MetricsFormat {
    /// Parse a metrics format identifier (case-insensitive) from a string slice.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "prometheus" => Some(Self::Prometheus),
            _ => None,
        }
    }
}

impl FromStr for MetricsFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| {
            format!("Unsupported metrics format '{value}', expected 'json' or 'prometheus'")
        })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
