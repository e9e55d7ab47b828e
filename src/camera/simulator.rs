//! Virtual camera replaying still images
//!
//! Useful for demos and for running the service on machines without a webcam:
//! point it at a directory of PNG/JPEG files (for example printed QR codes
//! photographed beforehand) and every image is served in turn at the configured
//! frame rate.

use crate::camera::{CaptureBackend, Frame, FrameSource, Resolution};
use crate::error::{Error, Result};
use image::imageops::{self, FilterType};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backend exposing a single virtual device at index 0
pub struct SimulatorBackend {
    frames: Arc<Vec<Frame>>,
    frame_interval: Duration,
}

impl SimulatorBackend {
    /// Build a simulator from in-memory frames
    pub fn from_frames(frames: Vec<Frame>, fps: u32) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::Config("Simulator needs at least one frame".to_string()));
        }
        Ok(Self {
            frames: Arc::new(frames),
            frame_interval: Duration::from_secs(1) / fps.max(1),
        })
    }

    /// Load every decodable image in `dir`, sorted by file name
    pub fn from_dir(dir: &Path, fps: u32) -> Result<Self> {
        let mut paths = std::fs::read_dir(dir)
            .map_err(|e| Error::Config(format!("Failed to read simulator dir {}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            match image::open(&path) {
                Ok(img) => frames.push(img.to_rgb8()),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping non-image file"),
            }
        }

        tracing::info!(dir = %dir.display(), frames = frames.len(), "Simulator frames loaded");
        Self::from_frames(frames, fps)
    }
}

impl CaptureBackend for SimulatorBackend {
    fn name(&self) -> &str {
        "simulator"
    }

    fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
        if index != 0 {
            return Err(Error::CameraNotFound(format!("Simulator has no device {index}")));
        }
        let (width, height) = self.frames[0].dimensions();
        Ok(Box::new(SimulatorSource {
            frames: Arc::clone(&self.frames),
            position: 0,
            resolution: Resolution::new(width, height),
            frame_interval: self.frame_interval,
            last_read: None,
        }))
    }
}

struct SimulatorSource {
    frames: Arc<Vec<Frame>>,
    position: usize,
    resolution: Resolution,
    frame_interval: Duration,
    last_read: Option<Instant>,
}

impl FrameSource for SimulatorSource {
    fn read(&mut self) -> Result<Frame> {
        // Pace like a real device so the stream loop does not spin
        if let Some(last) = self.last_read {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());

        let source = &self.frames[self.position % self.frames.len()];
        self.position = self.position.wrapping_add(1);

        if source.dimensions() == (self.resolution.width, self.resolution.height) {
            Ok(source.clone())
        } else {
            Ok(imageops::resize(
                source,
                self.resolution.width,
                self.resolution.height,
                FilterType::Triangle,
            ))
        }
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<Resolution> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(Error::Camera(format!("Invalid resolution {resolution}")));
        }
        self.resolution = resolution;
        Ok(resolution)
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }
}
