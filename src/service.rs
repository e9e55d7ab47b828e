//! Shared application state behind the HTTP handlers

use crate::cache::{LastQrCache, QrSighting};
use crate::camera::{CameraController, CameraStatus, SwitchOutcome};
use crate::error::{Error, Result};
use crate::qr::QrDetector;
use crate::stream::{FrameFeed, StreamSettings};
use std::sync::Arc;

/// Camera controller, last-result cache and stream settings for one process
pub struct CameraService {
    controller: Arc<CameraController>,
    cache: Arc<LastQrCache>,
    detector: QrDetector,
    stream: StreamSettings,
}

impl CameraService {
    /// Assemble the service around an existing controller
    pub fn new(controller: CameraController, stream: StreamSettings) -> Self {
        Self {
            controller: Arc::new(controller),
            cache: Arc::new(LastQrCache::new(stream.freshness)),
            detector: QrDetector::new(),
            stream,
        }
    }

    /// Underlying controller
    pub fn controller(&self) -> &Arc<CameraController> {
        &self.controller
    }

    /// Last-result cache written by video feeds
    pub fn cache(&self) -> &Arc<LastQrCache> {
        &self.cache
    }

    /// Pick and open the camera used at start-up.
    ///
    /// Uses `preferred` if it shows up in the enumeration, otherwise the first
    /// camera found. Returns `None` when nothing could be opened; the service
    /// keeps running and cameras can be started later over HTTP.
    pub async fn startup(&self, preferred: usize) -> Option<usize> {
        let available = self.enumerate().await;
        if available.is_empty() {
            tracing::warn!("No cameras found, starting without an active camera");
            return None;
        }

        let index = if available.contains(&preferred) {
            preferred
        } else {
            tracing::warn!(preferred, fallback = available[0], "Requested camera not available");
            available[0]
        };

        match self.start(Some(index)).await {
            Ok(index) => Some(index),
            Err(err) => {
                tracing::warn!(index, error = %err, "Could not start camera at startup");
                None
            }
        }
    }

    /// Probe for cameras and refresh the cached list
    pub async fn enumerate(&self) -> Vec<usize> {
        self.blocking(|c| c.enumerate()).await.unwrap_or_default()
    }

    /// Open `index` (or the current index when `None`)
    pub async fn start(&self, index: Option<usize>) -> Result<usize> {
        let result = self
            .blocking(move |c| {
                let index = index.unwrap_or_else(|| c.status().current_index);
                c.start(index)
            })
            .await?;
        match &result {
            Ok(index) => tracing::info!(index, "Camera started"),
            Err(err) => tracing::error!(error = %err, "Failed to start camera"),
        }
        result
    }

    /// Release the open camera. Returns whether one was active.
    pub async fn stop(&self) -> Result<bool> {
        let was_active = self.blocking(|c| c.stop()).await?;
        tracing::info!(was_active, "Camera stop requested");
        Ok(was_active)
    }

    /// Switch to `index` or to the next available camera
    pub async fn switch(&self, index: Option<usize>) -> Result<SwitchOutcome> {
        self.blocking(move |c| c.switch(index)).await?
    }

    /// Current controller status
    pub async fn status(&self) -> Result<CameraStatus> {
        self.blocking(|c| c.status()).await
    }

    /// Destructively read the last fresh QR payload
    pub fn take_qr_result(&self) -> Option<QrSighting> {
        self.cache.take()
    }

    /// Start a video feed. Fails if no camera is active right now.
    pub async fn video_feed(&self) -> Result<FrameFeed> {
        if !self.blocking(|c| c.is_active()).await? {
            return Err(Error::CameraInactive);
        }
        FrameFeed::new(
            Arc::clone(&self.controller),
            Arc::clone(&self.cache),
            self.detector.clone(),
            self.stream.clone(),
        )
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CameraController) -> T + Send + 'static,
    {
        let controller = Arc::clone(&self.controller);
        Ok(tokio::task::spawn_blocking(move || f(&controller)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraSettings, CaptureBackend, Frame, FrameSource, Resolution};
    use std::collections::HashSet;

    struct Fixed {
        working: HashSet<usize>,
    }

    struct Blank;

    impl CaptureBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
            if self.working.contains(&index) {
                Ok(Box::new(Blank))
            } else {
                Err(Error::CameraNotFound(format!("no device {index}")))
            }
        }
    }

    impl FrameSource for Blank {
        fn read(&mut self) -> Result<Frame> {
            Ok(Frame::new(8, 8))
        }

        fn set_resolution(&mut self, resolution: Resolution) -> Result<Resolution> {
            Ok(resolution)
        }

        fn resolution(&self) -> Resolution {
            Resolution::new(8, 8)
        }
    }

    fn service(working: &[usize]) -> CameraService {
        let backend = Fixed {
            working: working.iter().copied().collect(),
        };
        let controller = CameraController::new(vec![Arc::new(backend)], CameraSettings::default());
        CameraService::new(controller, StreamSettings::default())
    }

    #[tokio::test]
    async fn test_startup_prefers_requested_camera() {
        let svc = service(&[0, 2]);
        assert_eq!(svc.startup(2).await, Some(2));
        assert_eq!(svc.status().await.unwrap().current_index, 2);
    }

    #[tokio::test]
    async fn test_startup_falls_back_to_first_available() {
        let svc = service(&[1]);
        assert_eq!(svc.startup(0).await, Some(1));
    }

    #[tokio::test]
    async fn test_startup_without_cameras() {
        let svc = service(&[]);
        assert_eq!(svc.startup(0).await, None);
        assert!(!svc.status().await.unwrap().active);
    }

    #[tokio::test]
    async fn test_video_feed_requires_active_camera() {
        let svc = service(&[0]);
        assert!(matches!(svc.video_feed().await, Err(Error::CameraInactive)));

        svc.start(None).await.unwrap();
        assert!(svc.video_feed().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_reports_previous_state() {
        let svc = service(&[0]);
        assert!(!svc.stop().await.unwrap());
        svc.start(Some(0)).await.unwrap();
        assert!(svc.stop().await.unwrap());
    }
}
