//! Single open capture device

use crate::camera::{CaptureBackend, Frame, FrameSource, Resolution};
use crate::error::{Error, Result};
use std::sync::Arc;

/// An open (or released) camera device
///
/// The handle owns the driver resource exclusively. Once released, every
/// read reports an error instead of touching the device.
pub struct CameraHandle {
    index: usize,
    backend: String,
    source: Option<Box<dyn FrameSource>>,
}

impl CameraHandle {
    /// Open the device at `index` using the first backend that succeeds.
    ///
    /// `backends[0]` is the default; the remaining entries are fallbacks tried in
    /// order. The backend actually used is internal and only surfaces in logs.
    pub fn open(index: usize, backends: &[Arc<dyn CaptureBackend>]) -> Result<Self> {
        let mut last_error = None;

        for backend in backends {
            match backend.open(index) {
                Ok(source) => {
                    tracing::info!(
                        index,
                        backend = backend.name(),
                        resolution = %source.resolution(),
                        "Camera opened"
                    );
                    return Ok(Self {
                        index,
                        backend: backend.name().to_string(),
                        source: Some(source),
                    });
                }
                Err(err) => {
                    tracing::warn!(index, backend = backend.name(), error = %err, "Backend failed to open camera");
                    last_error = Some(err);
                }
            }
        }

        Err(Error::CameraOpen {
            index,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no capture backends configured".to_string()),
        })
    }

    /// Device index this handle was opened with
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the backend that opened the device
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Whether the device is still held open
    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Request a capture resolution; returns what the driver applied
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<Resolution> {
        let source = self.source.as_mut().ok_or(Error::CameraInactive)?;
        source.set_resolution(Resolution::new(width, height))
    }

    /// Read one frame
    pub fn read(&mut self) -> Result<Frame> {
        match self.source.as_mut() {
            Some(source) => source.read(),
            None => Err(Error::FrameCapture(format!(
                "camera {} has been released",
                self.index
            ))),
        }
    }

    /// Release the device. Safe to call more than once.
    pub fn release(&mut self) {
        if self.source.take().is_some() {
            tracing::info!(index = self.index, "Camera released");
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("index", &self.index)
            .field("backend", &self.backend)
            .field("is_open", &self.is_open())
            .finish()
    }
}
