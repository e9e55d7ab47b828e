//! Single-slot cache of the most recently decoded QR payload
//!
//! The streaming loop writes every hit; `/qr_result` consumes it. A read hands
//! out a fresh value exactly once and clears the slot. A value older than the
//! freshness window is cleared without being returned.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default freshness window
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5);

/// A payload handed out by [`LastQrCache::take`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrSighting {
    /// Decoded text
    pub payload: String,
    /// Detection time in seconds since the Unix epoch
    pub timestamp: f64,
}

#[derive(Default)]
struct Slot {
    payload: Option<String>,
    detected_at: f64,
}

/// Last QR code seen, guarded by a mutex
pub struct LastQrCache {
    slot: Mutex<Slot>,
    freshness: Duration,
}

impl LastQrCache {
    /// Create an empty cache with the given freshness window
    pub fn new(freshness: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            freshness,
        }
    }

    /// Record a payload detected now
    pub fn write(&self, payload: impl Into<String>) {
        self.write_at(payload, unix_now());
    }

    /// Record a payload detected at `timestamp` (seconds since the epoch)
    pub fn write_at(&self, payload: impl Into<String>, timestamp: f64) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.payload = Some(payload.into());
        slot.detected_at = timestamp;
    }

    /// Consume the cached payload if it is still fresh
    pub fn take(&self) -> Option<QrSighting> {
        self.take_at(unix_now())
    }

    /// Consume the cached payload as of `now` (seconds since the epoch)
    pub fn take_at(&self, now: f64) -> Option<QrSighting> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let payload = slot.payload.take()?;

        if now - slot.detected_at < self.freshness.as_secs_f64() {
            Some(QrSighting {
                payload,
                timestamp: slot.detected_at,
            })
        } else {
            tracing::debug!(age_secs = now - slot.detected_at, "Discarding stale QR result");
            None
        }
    }
}

impl Default for LastQrCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_value_is_returned_once() {
        let cache = LastQrCache::default();
        cache.write_at("TICKET-42", 10.0);

        let first = cache.take_at(12.0).expect("fresh result");
        assert_eq!(first.payload, "TICKET-42");
        assert_eq!(first.timestamp, 10.0);

        assert!(cache.take_at(12.1).is_none());
    }

    #[test]
    fn test_stale_value_is_cleared() {
        let cache = LastQrCache::default();
        cache.write_at("old", 10.0);
        assert!(cache.take_at(15.0).is_none());

        // Even a read at an earlier clock does not resurrect it
        assert!(cache.take_at(11.0).is_none());
    }

    #[test]
    fn test_newer_write_overwrites() {
        let cache = LastQrCache::default();
        cache.write_at("first", 1.0);
        cache.write_at("second", 2.0);
        assert_eq!(cache.take_at(3.0).unwrap().payload, "second");
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let cache = LastQrCache::new(Duration::from_secs(5));
        cache.write_at("edge", 100.0);
        assert!(cache.take_at(105.0).is_none());

        cache.write_at("edge", 100.0);
        assert!(cache.take_at(104.999).is_some());
    }

    #[test]
    fn test_write_uses_wall_clock() {
        let cache = LastQrCache::default();
        cache.write("now");
        let sighting = cache.take().expect("fresh");
        assert!((unix_now() - sighting.timestamp).abs() < 5.0);
    }

    #[test]
    fn test_empty_cache_reads_none() {
        let cache = LastQrCache::default();
        assert!(cache.take().is_none());
    }
}
