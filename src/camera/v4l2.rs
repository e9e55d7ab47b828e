//! V4L2 capture backends for Linux
//!
//! Each backend negotiates a single pixel format. Chaining an MJPEG backend in
//! front of YUYV and RGB24 ones gives the usual "try the fast path, fall back
//! to whatever the webcam speaks" behaviour.

use crate::camera::{CaptureBackend, Frame, FrameSource, Resolution};
use crate::error::{Error, Result};
use image::ImageBuffer;
use serde::{Deserialize, Serialize};
use std::io;
use std::mem;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Pixel format negotiated with the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Motion JPEG (compressed, recommended for high resolution)
    Mjpeg,
    /// YUYV 4:2:2 (uncompressed, better compatibility)
    Yuyv,
    /// RGB24 (uncompressed, high bandwidth)
    Rgb24,
}

impl PixelFormat {
    /// Convert to V4L2 FourCC code
    pub fn to_fourcc(self) -> v4l::FourCC {
        match self {
            PixelFormat::Mjpeg => v4l::FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => v4l::FourCC::new(b"RGB3"),
        }
    }

    /// Backend name used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Mjpeg => "mjpeg",
            PixelFormat::Yuyv => "yuyv",
            PixelFormat::Rgb24 => "rgb24",
        }
    }

    /// Parse from a user-provided string (case-insensitive)
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "mjpg" => Some(PixelFormat::Mjpeg),
            "yuyv" => Some(PixelFormat::Yuyv),
            "rgb" | "rgb24" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }
}

/// Information about a V4L2 capture device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device index (e.g., 0 for /dev/video0)
    pub index: usize,
    /// Device path (e.g., "/dev/video0")
    pub path: String,
    /// Card name reported by the driver
    pub name: String,
    /// Driver name
    pub driver: String,
    /// Bus information
    pub bus_info: String,
}

/// List V4L2 capture devices among `/dev/video0..limit`
pub fn list_devices(limit: usize) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for index in 0..limit {
        let Ok(dev) = v4l::Device::new(index) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Metadata nodes share the /dev/video namespace; only keep capture nodes
        if caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            devices.push(DeviceInfo {
                index,
                path: format!("/dev/video{index}"),
                name: caps.card,
                driver: caps.driver,
                bus_info: caps.bus,
            });
        }
    }

    devices
}

/// Backend opening `/dev/videoN` with one pixel format
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    format: PixelFormat,
    fps: u32,
    buffer_count: u32,
    read_timeout: Duration,
}

impl V4l2Backend {
    /// Create a backend for the given format
    pub fn new(format: PixelFormat, fps: u32, buffer_count: u32) -> Self {
        Self {
            format,
            fps: fps.max(1),
            buffer_count: buffer_count.max(2),
            read_timeout: Duration::from_secs(2),
        }
    }

    /// Fail a read when the driver delivers no frame within `timeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(Duration::from_millis(1));
        self
    }
}

impl CaptureBackend for V4l2Backend {
    fn name(&self) -> &str {
        self.format.as_str()
    }

    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
        let dev = Device::new(index)
            .map_err(|e| Error::Camera(format!("Failed to open /dev/video{index}: {e}")))?;

        let caps = dev
            .query_caps()
            .map_err(|e| Error::Camera(format!("Failed to query capabilities: {e}")))?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(Error::CameraNotFound(format!(
                "/dev/video{index} is not a capture device"
            )));
        }

        let current = dev
            .format()
            .map_err(|e| Error::Camera(format!("Failed to get format: {e}")))?;

        let mut source = V4l2Source {
            stream: None,
            device: Box::new(dev),
            format: self.format,
            fps: self.fps,
            buffer_count: self.buffer_count,
            read_timeout: self.read_timeout,
            resolution: Resolution::new(current.width, current.height),
        };
        source.negotiate(source.resolution)?;

        Ok(Box::new(source))
    }
}

/// Open V4L2 device with a lazily started mmap stream
struct V4l2Source {
    /// Memory-mapped stream; declared first so it drops before the device
    stream: Option<MmapStream<'static>>,
    device: Box<Device>,
    format: PixelFormat,
    fps: u32,
    buffer_count: u32,
    read_timeout: Duration,
    resolution: Resolution,
}

impl V4l2Source {
    /// Apply format and frame rate. The stream must not be running.
    fn negotiate(&mut self, wanted: Resolution) -> Result<Resolution> {
        let mut fmt = self
            .device
            .format()
            .map_err(|e| Error::Camera(format!("Failed to get format: {e}")))?;

        fmt.width = wanted.width;
        fmt.height = wanted.height;
        fmt.fourcc = self.format.to_fourcc();

        let applied = self
            .device
            .set_format(&fmt)
            .map_err(|e| Error::Camera(format!("Failed to set format: {e}")))?;

        if applied.fourcc != self.format.to_fourcc() {
            return Err(Error::Camera(format!(
                "Driver does not support {} (offered {})",
                self.format.as_str(),
                String::from_utf8_lossy(&applied.fourcc.repr)
            )));
        }

        let mut params = self
            .device
            .params()
            .map_err(|e| Error::Camera(format!("Failed to get params: {e}")))?;
        params.interval = v4l::Fraction::new(1, self.fps);
        if let Err(e) = self.device.set_params(&params) {
            tracing::debug!(error = %e, "Driver rejected frame interval");
        }

        self.resolution = Resolution::new(applied.width, applied.height);
        tracing::debug!(
            format = self.format.as_str(),
            resolution = %self.resolution,
            fps = self.fps,
            "V4L2 format negotiated"
        );
        Ok(self.resolution)
    }

    fn ensure_stream(&mut self) -> Result<&mut MmapStream<'static>> {
        if self.stream.is_none() {
            // SAFETY: the boxed device has a stable address and outlives the stream:
            // `stream` is declared before `device`, and `set_resolution` drops the
            // stream before touching the device again.
            let static_device: &'static Device =
                unsafe { mem::transmute::<&Device, &'static Device>(self.device.as_ref()) };

            let mut stream =
                MmapStream::with_buffers(static_device, Type::VideoCapture, self.buffer_count)
                    .map_err(|e| Error::FrameCapture(format!("Failed to create stream: {e}")))?;
            // Without a timeout the dequeue polls forever on a stalled device
            stream.set_timeout(self.read_timeout);
            self.stream = Some(stream);
        }

        self.stream
            .as_mut()
            .ok_or_else(|| Error::FrameCapture("stream unavailable".to_string()))
    }
}

impl FrameSource for V4l2Source {
    fn read(&mut self) -> Result<Frame> {
        let format = self.format;
        let resolution = self.resolution;
        let timeout = self.read_timeout;
        let stream = self.ensure_stream()?;

        let (buf, _meta) = stream.next().map_err(|e| capture_error(&e, timeout))?;

        decode_frame(format, resolution, buf)
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<Resolution> {
        self.stream = None;
        self.negotiate(resolution)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }
}

fn capture_error(err: &io::Error, timeout: Duration) -> Error {
    if err.kind() == io::ErrorKind::TimedOut {
        Error::FrameCapture(format!("No frame within {} ms", timeout.as_millis()))
    } else {
        Error::FrameCapture(format!("Failed to capture: {err}"))
    }
}

/// Decode a raw driver buffer into an RGB frame
fn decode_frame(format: PixelFormat, resolution: Resolution, buf: &[u8]) -> Result<Frame> {
    match format {
        PixelFormat::Mjpeg => image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
            .map(|img| img.to_rgb8())
            .map_err(|e| Error::Image(format!("MJPEG decode failed: {e}"))),
        PixelFormat::Yuyv => yuyv_to_rgb(buf, resolution),
        PixelFormat::Rgb24 => {
            let expected = (resolution.width * resolution.height * 3) as usize;
            let data = buf.get(..expected).ok_or_else(|| {
                Error::FrameCapture(format!(
                    "short RGB24 frame: {} of {expected} bytes",
                    buf.len()
                ))
            })?;
            ImageBuffer::from_raw(resolution.width, resolution.height, data.to_vec())
                .ok_or_else(|| Error::Image("Failed to create RGB image".to_string()))
        }
    }
}

/// Convert YUYV 4:2:2 to RGB using integer BT.601 coefficients
fn yuyv_to_rgb(yuyv: &[u8], resolution: Resolution) -> Result<Frame> {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    if yuyv.len() < width * height * 2 {
        return Err(Error::FrameCapture(format!(
            "short YUYV frame: {} of {} bytes",
            yuyv.len(),
            width * height * 2
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for chunk in yuyv[..width * height * 2].chunks_exact(4) {
        let u = chunk[1] as i32 - 128;
        let v = chunk[3] as i32 - 128;
        for y in [chunk[0] as i32, chunk[2] as i32] {
            rgb.push((y + ((v * 1436) >> 10)).clamp(0, 255) as u8);
            rgb.push((y - ((u * 352 + v * 731) >> 10)).clamp(0, 255) as u8);
            rgb.push((y + ((u * 1814) >> 10)).clamp(0, 255) as u8);
        }
    }

    ImageBuffer::from_raw(resolution.width, resolution.height, rgb)
        .ok_or_else(|| Error::Image("Failed to create RGB image from YUYV".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_fourcc() {
        assert_eq!(PixelFormat::Mjpeg.to_fourcc(), v4l::FourCC::new(b"MJPG"));
        assert_eq!(PixelFormat::Yuyv.to_fourcc(), v4l::FourCC::new(b"YUYV"));
    }

    #[test]
    fn test_pixel_format_from_str() {
        assert_eq!(PixelFormat::from_str("MJPEG"), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_str(" yuyv "), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_str("rgb24"), Some(PixelFormat::Rgb24));
        assert!(PixelFormat::from_str("h264").is_none());
    }

    #[test]
    fn test_yuyv_grey_converts_to_grey() {
        // Y=128, U=V=128 is mid grey
        let buf = vec![128u8; 4 * 2 * 2];
        let frame = yuyv_to_rgb(&buf, Resolution::new(4, 2)).unwrap();
        assert!(frame.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_short_buffers_are_rejected() {
        assert!(yuyv_to_rgb(&[0u8; 6], Resolution::new(4, 2)).is_err());
        assert!(decode_frame(PixelFormat::Rgb24, Resolution::new(2, 2), &[0u8; 5]).is_err());
    }

    #[test]
    fn test_capture_timeout_is_a_frame_capture_error() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF");
        match capture_error(&timed_out, Duration::from_millis(1500)) {
            Error::FrameCapture(msg) => assert_eq!(msg, "No frame within 1500 ms"),
            other => panic!("unexpected error: {other}"),
        }

        let other = io::Error::new(io::ErrorKind::Other, "EIO");
        assert!(matches!(capture_error(&other, Duration::from_secs(2)), Error::FrameCapture(_)));
    }

    #[test]
    fn test_backend_read_timeout_has_a_floor() {
        let backend = V4l2Backend::new(PixelFormat::Mjpeg, 30, 4).with_read_timeout(Duration::ZERO);
        assert_eq!(backend.read_timeout, Duration::from_millis(1));
    }

    #[test]
    fn test_list_devices() {
        assert!(list_devices(0).is_empty());

        // Device nodes depend on the host; whatever is found must be well formed
        let devices = list_devices(10);
        for dev in &devices {
            assert!(dev.index < 10);
            assert_eq!(dev.path, format!("/dev/video{}", dev.index));
        }
        assert!(devices.windows(2).all(|w| w[0].index < w[1].index));
    }
}
