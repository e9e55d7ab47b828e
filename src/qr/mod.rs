//! QR detection on camera frames
//!
//! Decoding is delegated to `rqrr`; this module adds the per-frame policy
//! (first symbol wins, errors mean "nothing this frame") and the operator
//! overlay drawn onto the streamed video.

mod detector;
pub mod overlay;

pub use detector::QrDetector;

use serde::{Deserialize, Serialize};

/// A point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position
    pub x: i32,
    /// Vertical position
    pub y: i32,
}

impl Point {
    /// Create a point
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Payload and location of one decoded symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedResult {
    /// Decoded text
    pub payload: String,
    /// Corner points reported by the decoder, in order
    pub bounding_polygon: Vec<Point>,
}
