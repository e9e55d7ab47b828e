//! Capture backend abstraction
//!
//! A backend knows how to turn a device index into a live [`FrameSource`].
//! Several backends can be chained: the first one is the default and the rest
//! are tried in order when it fails.

use crate::camera::{Frame, Resolution};
use crate::error::Result;

/// Driver interface used to open a capture device
pub trait CaptureBackend: Send + Sync {
    /// Short identifier used in logs and configuration (e.g. `mjpeg`)
    fn name(&self) -> &str;

    /// Open the device at `index`. The returned source owns the device until dropped.
    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>>;
}

/// An opened capture device
///
/// Dropping the source releases the underlying device.
pub trait FrameSource: Send {
    /// Block until the next frame is available and return it as RGB
    fn read(&mut self) -> Result<Frame>;

    /// Request a capture resolution, returning what the driver actually applied
    fn set_resolution(&mut self, resolution: Resolution) -> Result<Resolution>;

    /// Currently negotiated resolution
    fn resolution(&self) -> Resolution;
}
