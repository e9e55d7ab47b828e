//! Camera access for the scanner service
//!
//! Frame capture goes through the [`CaptureBackend`] trait so the rest of the
//! service never touches a driver directly. On Linux the V4L2 backends negotiate
//! one pixel format each; with the `simulator` feature a directory of still
//! images can stand in for a real device.

mod backend;
mod controller;
mod handle;

#[cfg(feature = "simulator")]
#[cfg_attr(docsrs, doc(cfg(feature = "simulator")))]
pub mod simulator;

#[cfg(feature = "camera")]
#[cfg_attr(docsrs, doc(cfg(feature = "camera")))]
pub mod v4l2;

pub use backend::{CaptureBackend, FrameSource};
pub use controller::{CameraController, CameraSettings, CameraStatus, SwitchOutcome};
pub use handle::CameraHandle;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A decoded RGB frame
pub type Frame = image::RgbImage;

/// Capture resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Resolution {
    /// Create a resolution from width and height
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        // 720p keeps QR modules large enough without saturating the USB link
        Self::new(1280, 720)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Build the backend chain described by the camera settings.
///
/// A simulator directory, when configured, replaces the hardware backends.
pub fn build_backends(settings: &CameraSettings) -> Result<Vec<Arc<dyn CaptureBackend>>> {
    #[cfg(feature = "simulator")]
    if let Some(dir) = settings.simulator_dir.as_deref() {
        let backend = simulator::SimulatorBackend::from_dir(dir, settings.fps)?;
        return Ok(vec![Arc::new(backend)]);
    }

    hardware_backends(settings)
}

#[cfg(feature = "camera")]
fn hardware_backends(settings: &CameraSettings) -> Result<Vec<Arc<dyn CaptureBackend>>> {
    let backends = settings
        .backends
        .iter()
        .map(|name| {
            let format = v4l2::PixelFormat::from_str(name).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown camera backend '{name}'. Use mjpeg, yuyv, or rgb24"
                ))
            })?;
            let backend = v4l2::V4l2Backend::new(format, settings.fps, settings.buffer_count)
                .with_read_timeout(settings.read_timeout);
            Ok(Arc::new(backend) as Arc<dyn CaptureBackend>)
        })
        .collect::<Result<Vec<_>>>()?;

    if backends.is_empty() {
        return Err(Error::Config("At least one camera backend is required".to_string()));
    }
    Ok(backends)
}

#[cfg(not(feature = "camera"))]
fn hardware_backends(_settings: &CameraSettings) -> Result<Vec<Arc<dyn CaptureBackend>>> {
    Err(Error::Config(
        "No camera backend available: built without the `camera` feature and no simulator directory configured"
            .to_string(),
    ))
}
