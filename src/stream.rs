//! MJPEG frame feed for `/video_feed`
//!
//! One [`FrameFeed`] lives per connected client. It is an explicit state
//! machine driven by [`FrameFeed::next_chunk`]; [`FrameFeed::into_stream`]
//! wraps it as a `futures::Stream` so dropping the response body (client
//! disconnect) cancels it.
//!
//! ```text
//! NoCamera ──camera active──▶ Streaming ◀──read ok── Degraded(n)
//!    ▲                          │  │                     │
//!    └──── camera stopped ──────┘  └────read failed─────▶│──n == max──▶ Stopped
//! ```

use crate::cache::LastQrCache;
use crate::camera::{CameraController, Frame, Resolution};
use crate::error::{Error, Result};
use crate::metrics;
use crate::qr::{QrDetector, overlay};
use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Multipart boundary used between JPEG parts
pub const BOUNDARY: &str = "frame";

/// Text shown while no camera is open
pub const NO_CAMERA_TEXT: &str = "CAMERA NOT AVAILABLE";
/// Text shown after a failed read
pub const READ_ERROR_TEXT: &str = "CAMERA READ ERROR";
/// Status line drawn on live frames
pub const ACTIVE_TEXT: &str = "CAMERA ACTIVE";

/// Tunables for the frame feed
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Consecutive failures that end the stream and release the camera
    pub max_consecutive_errors: u32,
    /// Pause after emitting an error frame
    pub error_backoff: Duration,
    /// Pause between placeholder frames while no camera is open
    pub placeholder_interval: Duration,
    /// Freshness window of the last-result cache
    pub freshness: Duration,
    /// Size of synthetic frames
    pub placeholder_size: Resolution,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_consecutive_errors: 5,
            error_backoff: Duration::from_millis(500),
            placeholder_interval: Duration::from_secs(1),
            freshness: crate::cache::DEFAULT_FRESHNESS,
            placeholder_size: Resolution::new(640, 480),
        }
    }
}

/// Where the feed currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No open camera; placeholders are sent until one becomes active
    NoCamera,
    /// Reading live frames
    Streaming,
    /// The last `n` reads from the same camera failed
    Degraded(u32),
    /// The camera was given up on; the stream has ended
    Stopped,
}

/// Per-client MJPEG producer
pub struct FrameFeed {
    controller: Arc<CameraController>,
    cache: Arc<LastQrCache>,
    detector: QrDetector,
    settings: StreamSettings,
    state: FeedState,
    failing_camera: Option<usize>,
    pause: Option<Duration>,
    last_frame: Option<Instant>,
    placeholder_chunk: Bytes,
    error_chunk: Bytes,
}

impl FrameFeed {
    /// Create a feed. Synthetic frames are encoded once up front.
    pub fn new(
        controller: Arc<CameraController>,
        cache: Arc<LastQrCache>,
        detector: QrDetector,
        settings: StreamSettings,
    ) -> Result<Self> {
        let size = settings.placeholder_size;
        let quality = settings.jpeg_quality;
        let placeholder_chunk = mjpeg_chunk(&encode_jpeg(
            &overlay::placeholder(size.width, size.height, NO_CAMERA_TEXT),
            quality,
        )?);
        let error_chunk = mjpeg_chunk(&encode_jpeg(
            &overlay::placeholder(size.width, size.height, READ_ERROR_TEXT),
            quality,
        )?);

        let state = if controller.is_active() {
            FeedState::Streaming
        } else {
            FeedState::NoCamera
        };

        metrics::stream_opened();
        Ok(Self {
            controller,
            cache,
            detector,
            settings,
            state,
            failing_camera: None,
            pause: None,
            last_frame: None,
            placeholder_chunk,
            error_chunk,
        })
    }

    /// Current state
    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Produce the next multipart chunk, or `None` once the feed has stopped.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        if let Some(pause) = self.pause.take() {
            tokio::time::sleep(pause).await;
        }

        loop {
            match self.state {
                FeedState::Stopped => return None,
                FeedState::NoCamera => {
                    if self.camera_active().await {
                        tracing::info!("Camera became active, resuming live frames");
                        self.state = FeedState::Streaming;
                        continue;
                    }
                    metrics::record_placeholder();
                    self.pause = Some(self.settings.placeholder_interval);
                    return Some(self.placeholder_chunk.clone());
                }
                FeedState::Streaming | FeedState::Degraded(_) => match self.capture().await {
                    Captured::Frame(chunk) => {
                        self.state = FeedState::Streaming;
                        self.failing_camera = None;
                        return Some(chunk);
                    }
                    Captured::NoCamera => {
                        tracing::debug!("Camera no longer active, sending placeholders");
                        self.state = FeedState::NoCamera;
                        self.failing_camera = None;
                        self.last_frame = None;
                    }
                    Captured::Failed { index, error } => return self.on_failure(index, error).await,
                },
            }
        }
    }

    /// Wrap the feed as a body stream; dropping it stops the feed
    pub fn into_stream(self) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send {
        futures::stream::unfold(self, |mut feed| async move {
            feed.next_chunk().await.map(|chunk| (Ok(chunk), feed))
        })
    }

    async fn on_failure(&mut self, index: usize, err: Error) -> Option<Bytes> {
        // Failures only accumulate while the same camera stays open
        let failures = match self.state {
            FeedState::Degraded(n) if self.failing_camera == Some(index) => n + 1,
            _ => 1,
        };
        self.failing_camera = Some(index);
        metrics::record_read_failure(u64::from(failures));

        if failures >= self.settings.max_consecutive_errors {
            tracing::error!(index, failures, error = %err, "Too many consecutive camera errors, stopping stream");
            let controller = Arc::clone(&self.controller);
            match tokio::task::spawn_blocking(move || controller.deactivate(index)).await {
                Ok(true) => {}
                Ok(false) => {
                    // Another camera took over between the read and the release
                    self.state = FeedState::Streaming;
                    self.failing_camera = None;
                    self.pause = Some(self.settings.error_backoff);
                    return Some(self.error_chunk.clone());
                }
                Err(join) => tracing::error!(error = %join, "Camera deactivation task failed"),
            }
            self.state = FeedState::Stopped;
            return None;
        }

        tracing::warn!(index, failures, error = %err, "Camera read failed");
        self.state = FeedState::Degraded(failures);
        self.pause = Some(self.settings.error_backoff);
        Some(self.error_chunk.clone())
    }

    async fn camera_active(&self) -> bool {
        let controller = Arc::clone(&self.controller);
        tokio::task::spawn_blocking(move || controller.is_active())
            .await
            .unwrap_or(false)
    }

    /// Read, detect, annotate and encode one frame off the async runtime
    async fn capture(&mut self) -> Captured {
        let controller = Arc::clone(&self.controller);
        let cache = Arc::clone(&self.cache);
        let detector = self.detector.clone();
        let quality = self.settings.jpeg_quality;

        let task = tokio::task::spawn_blocking(move || {
            let Some((index, read)) = controller.read_frame() else {
                return None;
            };
            let encoded = read.and_then(|mut frame| {
                let detected = detector.detect(&mut frame);
                if let Some(result) = &detected {
                    tracing::info!(payload = %result.payload, "QR code detected");
                    cache.write(result.payload.clone());
                }
                overlay::draw_text(&mut frame, 10, 10, ACTIVE_TEXT, overlay::GREEN, 2);
                Ok((encode_jpeg(&frame, quality)?, detected.is_some()))
            });
            Some((index, encoded))
        });

        let (index, encoded) = match task.await {
            Ok(Some(read)) => read,
            Ok(None) => return Captured::NoCamera,
            Err(join) => {
                // Panicked read, charged to the camera already failing
                let index = self.failing_camera.unwrap_or_default();
                return Captured::Failed {
                    index,
                    error: join.into(),
                };
            }
        };

        let (jpeg, detected) = match encoded {
            Ok(encoded) => encoded,
            Err(error) => return Captured::Failed { index, error },
        };

        if detected {
            metrics::record_detection();
        }
        let now = Instant::now();
        metrics::record_frame(self.last_frame.map(|prev| now - prev));
        self.last_frame = Some(now);

        Captured::Frame(mjpeg_chunk(&jpeg))
    }
}

/// Outcome of one capture attempt
enum Captured {
    Frame(Bytes),
    NoCamera,
    Failed { index: usize, error: Error },
}

impl Drop for FrameFeed {
    fn drop(&mut self) {
        tracing::debug!(state = ?self.state, "Video feed closed");
        metrics::stream_closed(self.state == FeedState::Stopped);
    }
}

/// Encode an RGB frame as baseline JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(frame.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Frame one JPEG as a `multipart/x-mixed-replace` part
pub fn mjpeg_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut chunk = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    chunk.put_slice(header.as_bytes());
    chunk.put_slice(jpeg);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}
