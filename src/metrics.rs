//! Process-wide stream metrics
//!
//! Counters are cumulative since start-up. The streaming loop records into a
//! global registry; `/metrics` renders it as JSON or Prometheus text, and
//! [`enable`] additionally logs a summary on a fixed interval.

use crate::config::MetricsFormat;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

static METRICS: OnceLock<Arc<MetricsInner>> = OnceLock::new();

const MIN_INTERVAL_SECS: u64 = 5;

fn registry() -> &'static Arc<MetricsInner> {
    METRICS.get_or_init(|| Arc::new(MetricsInner::new(60)))
}

/// Start periodic metrics logging with the provided interval in seconds.
///
/// Must be called from within a Tokio runtime.
pub fn enable(interval_secs: u64) {
    let inner = registry();
    inner.update_interval(interval_secs);
    inner.ensure_task();
}

/// A live frame was sent; `interval` is the gap since the previous one on the same stream
pub fn record_frame(interval: Option<Duration>) {
    registry().update(|state| {
        state.frames_streamed += 1;
        if let Some(interval) = interval {
            state.frame_interval_total += interval;
            state.frame_interval_samples += 1;
            state.frame_interval_max = state.frame_interval_max.max(interval);
            state.last_frame_interval = Some(interval);
        }
    });
}

/// A "camera not available" frame was sent
pub fn record_placeholder() {
    registry().update(|state| state.placeholder_frames += 1);
}

/// A camera read (or encode) failed; `consecutive` is the stream's current run length
pub fn record_read_failure(consecutive: u64) {
    registry().update(|state| {
        state.read_failures += 1;
        state.error_frames_peak = state.error_frames_peak.max(consecutive);
    });
}

/// A QR payload was decoded
pub fn record_detection() {
    registry().update(|state| state.qr_detections += 1);
}

/// A `/video_feed` client connected
pub fn stream_opened() {
    registry().update(|state| {
        state.streams_opened += 1;
        state.active_streams += 1;
    });
}

/// A `/video_feed` stream ended; `stopped` is true when the camera was given up on
pub fn stream_closed(stopped: bool) {
    registry().update(|state| {
        state.active_streams = state.active_streams.saturating_sub(1);
        if stopped {
            state.streams_stopped += 1;
        }
    });
}

/// Current counter values
pub fn snapshot() -> MetricsSnapshot {
    registry().snapshot()
}

/// Render the current counters in `format`, returning `(content_type, body)`
pub fn render(format: MetricsFormat) -> (&'static str, String) {
    let snapshot = snapshot();
    match format {
        MetricsFormat::Json => (
            "application/json",
            serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string()),
        ),
        MetricsFormat::Prometheus => ("text/plain; version=0.0.4", render_prometheus(&snapshot)),
    }
}

struct MetricsInner {
    state: Mutex<MetricsState>,
    interval_secs: AtomicU64,
    task_spawned: AtomicBool,
}

impl MetricsInner {
    fn new(interval_secs: u64) -> Self {
        Self {
            state: Mutex::new(MetricsState::new()),
            interval_secs: AtomicU64::new(interval_secs.max(MIN_INTERVAL_SECS)),
            task_spawned: AtomicBool::new(false),
        }
    }

    fn update_interval(&self, interval_secs: u64) {
        self.interval_secs
            .store(interval_secs.max(MIN_INTERVAL_SECS), Ordering::Relaxed);
    }

    fn ensure_task(self: &Arc<Self>) {
        if self
            .task_spawned
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let runner = Arc::clone(self);
            tokio::spawn(async move {
                runner.run().await;
            });
        }
    }

    fn update(&self, f: impl FnOnce(&mut MetricsState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.snapshot()
    }

    async fn run(self: Arc<Self>) {
        let mut current_secs = self.interval_secs.load(Ordering::Relaxed);
        loop {
            let mut ticker = time::interval(Duration::from_secs(current_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                log_snapshot(&self.snapshot());

                let next_secs = self.interval_secs.load(Ordering::Relaxed);
                if next_secs != current_secs {
                    current_secs = next_secs;
                    break;
                }
            }
        }
    }
}

struct MetricsState {
    started: Instant,
    frames_streamed: u64,
    placeholder_frames: u64,
    read_failures: u64,
    error_frames_peak: u64,
    qr_detections: u64,
    streams_opened: u64,
    streams_stopped: u64,
    active_streams: u64,
    frame_interval_total: Duration,
    frame_interval_samples: u64,
    frame_interval_max: Duration,
    last_frame_interval: Option<Duration>,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            frames_streamed: 0,
            placeholder_frames: 0,
            read_failures: 0,
            error_frames_peak: 0,
            qr_detections: 0,
            streams_opened: 0,
            streams_stopped: 0,
            active_streams: 0,
            frame_interval_total: Duration::ZERO,
            frame_interval_samples: 0,
            frame_interval_max: Duration::ZERO,
            last_frame_interval: None,
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let frame_intervals = (self.frame_interval_samples > 0).then(|| {
            let divisor = u32::try_from(self.frame_interval_samples).unwrap_or(u32::MAX);
            let avg = self.frame_interval_total / divisor;
            FrameIntervals {
                avg_ms: avg.as_secs_f64() * 1_000.0,
                max_ms: self.frame_interval_max.as_secs_f64() * 1_000.0,
                last_ms: self.last_frame_interval.unwrap_or(avg).as_secs_f64() * 1_000.0,
            }
        });

        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            frames_streamed: self.frames_streamed,
            placeholder_frames: self.placeholder_frames,
            read_failures: self.read_failures,
            consecutive_failures_peak: self.error_frames_peak,
            qr_detections: self.qr_detections,
            streams_opened: self.streams_opened,
            streams_stopped: self.streams_stopped,
            active_streams: self.active_streams,
            frame_intervals,
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the registry was created
    pub uptime_secs: u64,
    /// Live camera frames sent to clients
    pub frames_streamed: u64,
    /// "Camera not available" frames sent
    pub placeholder_frames: u64,
    /// Failed camera reads or encodes
    pub read_failures: u64,
    /// Longest run of consecutive failures seen on any stream
    pub consecutive_failures_peak: u64,
    /// QR payloads decoded
    pub qr_detections: u64,
    /// `/video_feed` streams started
    pub streams_opened: u64,
    /// Streams ended because the camera kept failing
    pub streams_stopped: u64,
    /// Streams currently connected
    pub active_streams: u64,
    /// Frame pacing statistics, absent until two live frames were sent
    pub frame_intervals: Option<FrameIntervals>,
}

/// Frame interval statistics in milliseconds
#[derive(Debug, Clone, Serialize)]
pub struct FrameIntervals {
    /// Mean interval
    pub avg_ms: f64,
    /// Largest interval
    pub max_ms: f64,
    /// Most recent interval
    pub last_ms: f64,
}

fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        target: "qrfeed::metrics",
        uptime_secs = snapshot.uptime_secs,
        frames_streamed = snapshot.frames_streamed,
        placeholder_frames = snapshot.placeholder_frames,
        read_failures = snapshot.read_failures,
        qr_detections = snapshot.qr_detections,
        active_streams = snapshot.active_streams,
        streams_stopped = snapshot.streams_stopped,
        frame_interval_avg_ms = snapshot.frame_intervals.as_ref().map(|f| f.avg_ms),
        "Stream metrics"
    );
}

fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();

    let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
        let _ = writeln!(output, "# HELP qrfeed_{name} {help}");
        let _ = writeln!(output, "# TYPE qrfeed_{name} {kind}");
        let _ = writeln!(output, "qrfeed_{name} {value}");
    };

    metric("uptime_seconds", "gauge", "Seconds since start-up", snapshot.uptime_secs);
    metric("frames_streamed_total", "counter", "Live camera frames sent", snapshot.frames_streamed);
    metric(
        "placeholder_frames_total",
        "counter",
        "Camera-not-available frames sent",
        snapshot.placeholder_frames,
    );
    metric("read_failures_total", "counter", "Failed camera reads", snapshot.read_failures);
    metric(
        "consecutive_failures_peak",
        "gauge",
        "Longest run of consecutive read failures",
        snapshot.consecutive_failures_peak,
    );
    metric("qr_detections_total", "counter", "QR payloads decoded", snapshot.qr_detections);
    metric("streams_opened_total", "counter", "Video streams started", snapshot.streams_opened);
    metric(
        "streams_stopped_total",
        "counter",
        "Video streams ended after repeated camera failures",
        snapshot.streams_stopped,
    );
    metric("active_streams", "gauge", "Connected video streams", snapshot.active_streams);

    if let Some(intervals) = &snapshot.frame_intervals {
        let _ = writeln!(output, "# HELP qrfeed_frame_interval_seconds Frame interval statistics");
        let _ = writeln!(output, "# TYPE qrfeed_frame_interval_seconds gauge");
        for (stat, ms) in [
            ("avg", intervals.avg_ms),
            ("max", intervals.max_ms),
            ("last", intervals.last_ms),
        ] {
            let _ = writeln!(
                output,
                "qrfeed_frame_interval_seconds{{stat=\"{stat}\"}} {:.6}",
                ms / 1_000.0
            );
        }
    }

    output
}
