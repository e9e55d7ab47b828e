//! Camera lifecycle: enumerate, start, stop, switch and frame reads
//!
//! Every operation that touches the device goes through one mutex, so a
//! lifecycle request can never release a handle while a streaming read is in
//! flight. All methods block on driver I/O; async callers should run them on
//! `tokio::task::spawn_blocking`.

use crate::camera::{CameraHandle, CaptureBackend, Frame, Resolution};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Resolved camera settings used by the controller and backends
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Index opened at startup
    pub index: usize,
    /// Resolution requested after each open
    pub resolution: Resolution,
    /// Frames per second requested from the driver
    pub fps: u32,
    /// Number of driver buffers to keep mapped
    pub buffer_count: u32,
    /// Longest a single read may wait for the driver before failing
    pub read_timeout: Duration,
    /// Backend names, default first
    pub backends: Vec<String>,
    /// Indices `0..probe_count` are probed by `enumerate`
    pub probe_count: usize,
    /// Replay still images from this directory instead of opening hardware
    pub simulator_dir: Option<PathBuf>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            resolution: Resolution::default(),
            fps: 30,
            buffer_count: 4,
            read_timeout: Duration::from_secs(2),
            backends: vec!["mjpeg".to_string(), "yuyv".to_string(), "rgb24".to_string()],
            probe_count: 3,
            simulator_dir: None,
        }
    }
}

/// Snapshot of the controller state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    /// Whether a device is currently open
    pub active: bool,
    /// Last index successfully opened (or the configured one before any open)
    pub current_index: usize,
    /// Indices found by the most recent enumeration
    pub available: Vec<usize>,
}

/// Result of a switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The requested camera is now active
    Switched(usize),
    /// The requested camera failed and the previous one was reopened
    Reverted {
        /// Index that could not be opened
        requested: usize,
        /// Index active again
        active: usize,
    },
}

impl SwitchOutcome {
    /// Index active after the switch
    pub fn active_index(&self) -> usize {
        match *self {
            SwitchOutcome::Switched(index) => index,
            SwitchOutcome::Reverted { active, .. } => active,
        }
    }
}

struct ControllerState {
    handle: Option<CameraHandle>,
    current_index: usize,
    available: Vec<usize>,
}

/// Owner of the process-wide camera handle
pub struct CameraController {
    backends: Vec<Arc<dyn CaptureBackend>>,
    settings: CameraSettings,
    state: Mutex<ControllerState>,
}

impl CameraController {
    /// Create a controller with no camera open
    pub fn new(backends: Vec<Arc<dyn CaptureBackend>>, settings: CameraSettings) -> Self {
        let state = ControllerState {
            handle: None,
            current_index: settings.index,
            available: Vec::new(),
        };
        Self {
            backends,
            settings,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // A panic while holding the lock cannot leave the slot half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe indices `0..probe_count` and cache the working ones.
    ///
    /// Each probe opens and immediately releases the device. The index held by
    /// the active handle is reported without being reopened.
    pub fn enumerate(&self) -> Vec<usize> {
        let mut state = self.lock();
        let held = state
            .handle
            .as_ref()
            .filter(|h| h.is_open())
            .map(|h| h.index());

        let mut found = Vec::new();
        for index in 0..self.settings.probe_count {
            if held == Some(index) {
                found.push(index);
                continue;
            }
            match CameraHandle::open(index, &self.backends) {
                Ok(mut handle) => {
                    handle.release();
                    found.push(index);
                }
                Err(err) => tracing::debug!(index, error = %err, "Camera probe failed"),
            }
        }

        tracing::info!(cameras = ?found, "Available cameras");
        state.available = found.clone();
        found
    }

    /// Release any open camera and open `index`.
    pub fn start(&self, index: usize) -> Result<usize> {
        let mut state = self.lock();
        self.open_locked(&mut state, index)?;
        Ok(index)
    }

    /// Release the open camera. Returns whether one was active.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        match state.handle.take() {
            Some(mut handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Switch to `explicit` or to the next available camera.
    ///
    /// Without an explicit index the next entry after the current one in the
    /// last enumerated list is used, wrapping around. If the target cannot be
    /// opened and a camera was working before the call, that camera is reopened.
    pub fn switch(&self, explicit: Option<usize>) -> Result<SwitchOutcome> {
        let mut state = self.lock();

        let target = match explicit {
            Some(index) => index,
            None => next_available(&state.available, state.current_index)
                .ok_or_else(|| Error::CameraNotFound("No cameras available".to_string()))?,
        };

        let previous = state.handle.as_ref().filter(|h| h.is_open()).map(|h| h.index());

        match self.open_locked(&mut state, target) {
            Ok(()) => Ok(SwitchOutcome::Switched(target)),
            Err(err) => match previous {
                Some(prev) if prev != target => {
                    tracing::warn!(requested = target, previous = prev, error = %err, "Switch failed, reverting");
                    self.open_locked(&mut state, prev)?;
                    Ok(SwitchOutcome::Reverted {
                        requested: target,
                        active: prev,
                    })
                }
                _ => Err(err),
            },
        }
    }

    /// Read one frame from the active camera, tagged with the camera's index.
    ///
    /// `None` means no camera is open.
    pub fn read_frame(&self) -> Option<(usize, Result<Frame>)> {
        let mut state = self.lock();
        match state.handle.as_mut() {
            Some(handle) if handle.is_open() => Some((handle.index(), handle.read())),
            _ => None,
        }
    }

    /// Release camera `index` after the streaming loop gave up on it.
    ///
    /// Does nothing if another camera was opened in the meantime. Returns
    /// whether a camera was released.
    pub fn deactivate(&self, index: usize) -> bool {
        let mut state = self.lock();
        match state.handle.as_ref() {
            Some(handle) if handle.index() == index => {}
            Some(handle) => {
                tracing::info!(failing = index, active = handle.index(), "Camera changed, keeping it open");
                return false;
            }
            None => return false,
        }

        match state.handle.take() {
            Some(mut handle) => {
                tracing::warn!(index, "Deactivating camera after repeated read failures");
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Whether a camera is open
    pub fn is_active(&self) -> bool {
        self.lock().handle.as_ref().is_some_and(|h| h.is_open())
    }

    /// Current status snapshot
    pub fn status(&self) -> CameraStatus {
        let state = self.lock();
        CameraStatus {
            active: state.handle.as_ref().is_some_and(|h| h.is_open()),
            current_index: state.current_index,
            available: state.available.clone(),
        }
    }

    fn open_locked(&self, state: &mut ControllerState, index: usize) -> Result<()> {
        if let Some(mut old) = state.handle.take() {
            old.release();
        }

        let mut handle = CameraHandle::open(index, &self.backends)?;
        let wanted = self.settings.resolution;
        match handle.set_resolution(wanted.width, wanted.height) {
            Ok(applied) if applied != wanted => {
                tracing::info!(index, requested = %wanted, applied = %applied, "Driver adjusted resolution");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(index, error = %err, "Could not set camera resolution"),
        }

        state.handle = Some(handle);
        state.current_index = index;
        Ok(())
    }
}

fn next_available(available: &[usize], current: usize) -> Option<usize> {
    if available.is_empty() {
        return None;
    }
    let next = match available.iter().position(|&i| i == current) {
        Some(pos) => (pos + 1) % available.len(),
        None => 0,
    };
    Some(available[next])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FrameSource;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestBackend {
        working: Mutex<HashSet<usize>>,
        opens: AtomicUsize,
    }

    impl TestBackend {
        fn new(working: &[usize]) -> Arc<Self> {
            Arc::new(Self {
                working: Mutex::new(working.iter().copied().collect()),
                opens: AtomicUsize::new(0),
            })
        }

        fn set_working(&self, working: &[usize]) {
            *self.working.lock().unwrap() = working.iter().copied().collect();
        }
    }

    struct TestSource(Resolution);

    impl FrameSource for TestSource {
        fn read(&mut self) -> Result<Frame> {
            Ok(Frame::new(self.0.width, self.0.height))
        }

        fn set_resolution(&mut self, resolution: Resolution) -> Result<Resolution> {
            self.0 = resolution;
            Ok(resolution)
        }

        fn resolution(&self) -> Resolution {
            self.0
        }
    }

    impl CaptureBackend for TestBackend {
        fn name(&self) -> &str {
            "test"
        }

        fn open(&self, index: usize) -> Result<Box<dyn FrameSource>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.working.lock().unwrap().contains(&index) {
                Ok(Box::new(TestSource(Resolution::new(32, 24))))
            } else {
                Err(Error::Camera(format!("no device {index}")))
            }
        }
    }

    fn controller(backend: &Arc<TestBackend>) -> CameraController {
        let settings = CameraSettings {
            resolution: Resolution::new(64, 48),
            ..CameraSettings::default()
        };
        CameraController::new(vec![backend.clone() as Arc<dyn CaptureBackend>], settings)
    }

    #[test]
    fn test_enumerate_reports_only_openable_indices() {
        let backend = TestBackend::new(&[0, 2, 5]);
        let ctrl = controller(&backend);
        assert_eq!(ctrl.enumerate(), vec![0, 2]);
        assert_eq!(ctrl.status().available, vec![0, 2]);
        assert!(!ctrl.is_active());
    }

    #[test]
    fn test_enumerate_skips_reopening_active_camera() {
        let backend = TestBackend::new(&[0, 1]);
        let ctrl = controller(&backend);
        ctrl.start(1).unwrap();
        let before = backend.opens.load(Ordering::SeqCst);
        assert_eq!(ctrl.enumerate(), vec![0, 1]);
        // indices 0 and 2 probed, 1 is held
        assert_eq!(backend.opens.load(Ordering::SeqCst) - before, 2);
        assert!(ctrl.is_active());
    }

    #[test]
    fn test_start_applies_resolution_and_reads() {
        let backend = TestBackend::new(&[0]);
        let ctrl = controller(&backend);
        assert_eq!(ctrl.start(0).unwrap(), 0);
        let (index, frame) = ctrl.read_frame().expect("camera open");
        assert_eq!(index, 0);
        assert_eq!(frame.unwrap().dimensions(), (64, 48));
    }

    #[test]
    fn test_start_failure_leaves_camera_inactive() {
        let backend = TestBackend::new(&[0]);
        let ctrl = controller(&backend);
        ctrl.start(0).unwrap();
        assert!(ctrl.start(4).is_err());
        assert!(!ctrl.is_active());
        assert_eq!(ctrl.status().current_index, 0);
    }

    #[test]
    fn test_stop_reports_previous_state() {
        let backend = TestBackend::new(&[0]);
        let ctrl = controller(&backend);
        assert!(!ctrl.stop());
        ctrl.start(0).unwrap();
        assert!(ctrl.stop());
        assert!(ctrl.read_frame().is_none());
    }

    #[test]
    fn test_switch_cycles_through_available_list() {
        let backend = TestBackend::new(&[0, 1, 2]);
        let ctrl = controller(&backend);
        ctrl.enumerate();
        ctrl.start(0).unwrap();
        assert_eq!(ctrl.switch(None).unwrap(), SwitchOutcome::Switched(1));
        assert_eq!(ctrl.switch(None).unwrap(), SwitchOutcome::Switched(2));
        assert_eq!(ctrl.switch(None).unwrap(), SwitchOutcome::Switched(0));
    }

    #[test]
    fn test_switch_with_empty_list_is_not_found() {
        let backend = TestBackend::new(&[]);
        let ctrl = controller(&backend);
        assert!(matches!(ctrl.switch(None), Err(Error::CameraNotFound(_))));
    }

    #[test]
    fn test_switch_reverts_to_previous_camera() {
        let backend = TestBackend::new(&[0, 1]);
        let ctrl = controller(&backend);
        ctrl.enumerate();
        ctrl.start(0).unwrap();
        backend.set_working(&[0]);

        let outcome = ctrl.switch(None).unwrap();
        assert_eq!(
            outcome,
            SwitchOutcome::Reverted {
                requested: 1,
                active: 0
            }
        );
        assert_eq!(outcome.active_index(), 0);
        assert!(ctrl.is_active());
    }

    #[test]
    fn test_switch_explicit_without_previous_fails() {
        let backend = TestBackend::new(&[0]);
        let ctrl = controller(&backend);
        assert!(matches!(ctrl.switch(Some(3)), Err(Error::CameraOpen { index: 3, .. })));
        assert_eq!(ctrl.switch(Some(0)).unwrap(), SwitchOutcome::Switched(0));
    }

    #[test]
    fn test_deactivate_releases_camera() {
        let backend = TestBackend::new(&[0]);
        let ctrl = controller(&backend);
        ctrl.start(0).unwrap();
        assert!(ctrl.deactivate(0));
        assert!(!ctrl.status().active);
        assert!(!ctrl.deactivate(0));
    }

    #[test]
    fn test_deactivate_ignores_replaced_camera() {
        let backend = TestBackend::new(&[0, 1]);
        let ctrl = controller(&backend);
        ctrl.start(0).unwrap();
        ctrl.start(1).unwrap();

        assert!(!ctrl.deactivate(0));
        assert!(ctrl.is_active());
        assert_eq!(ctrl.status().current_index, 1);
    }

    #[test]
    fn test_next_available_wraps_and_handles_unknown_current() {
        assert_eq!(next_available(&[0, 2], 2), Some(0));
        assert_eq!(next_available(&[0, 2], 1), Some(0));
        assert_eq!(next_available(&[3], 3), Some(3));
        assert_eq!(next_available(&[], 0), None);
    }
}
