//! QRFEED - local webcam QR scanner service
//!
//! Opens a webcam, decodes QR codes from its frames, streams an annotated MJPEG
//! preview to browsers and exposes the last decoded payload over a small JSON
//! API for polling clients.
//!
//! # Features
//!
//! - **Camera Integration**: V4L2 capture with MJPEG/YUYV/RGB24 backend fallback
//! - **QR Processing**: per-frame decoding with `rqrr` and an on-frame overlay
//! - **Polling API**: destructive, freshness-bounded read of the last payload
//! - **Async-first**: `axum` on Tokio, blocking camera I/O kept off the runtime
//!
//! # Example
//!
//! ```no_run
//! use qrfeed::api::{self, AppState};
//! use qrfeed::camera::{self, CameraController};
//! use qrfeed::service::CameraService;
//! use qrfeed::QrfeedConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = QrfeedConfig::load(None)?;
//!     let settings = config.camera_settings()?;
//!     let backends = camera::build_backends(&settings)?;
//!     let service = Arc::new(CameraService::new(
//!         CameraController::new(backends, settings),
//!         config.stream_settings()?,
//!     ));
//!     service.startup(0).await;
//!
//!     let app = api::router(AppState::new(service), &config.server);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5005").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api;
pub mod cache;
pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod qr;
pub mod service;
pub mod stream;

// Re-exports for convenience
pub use cache::{LastQrCache, QrSighting};
pub use camera::{CameraController, CameraSettings, CaptureBackend, Frame, FrameSource, Resolution};
pub use config::{LogRotation, LoggingOptions, MetricsFormat, QrfeedConfig};
pub use error::{Error, Result};
pub use qr::{DecodedResult, QrDetector};
pub use service::CameraService;
pub use stream::{FeedState, FrameFeed, StreamSettings};
