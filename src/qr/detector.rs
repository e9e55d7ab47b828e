use crate::camera::Frame;
use crate::error::{Error, Result};
use crate::qr::overlay::{self, GREEN};
use crate::qr::{DecodedResult, Point};
use image::GrayImage;

const OUTLINE_THICKNESS: u32 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_GAP: i32 = 10;

/// Per-frame QR detector
///
/// Wraps `rqrr` and, unless built with [`QrDetector::without_overlay`], draws
/// the symbol outline and payload onto the frame it was given.
#[derive(Debug, Clone)]
pub struct QrDetector {
    annotate: bool,
}

impl QrDetector {
    /// Detector that annotates frames
    pub fn new() -> Self {
        Self { annotate: true }
    }

    /// Detector that leaves frames untouched
    pub fn without_overlay() -> Self {
        Self { annotate: false }
    }

    /// Decode the first readable symbol in a greyscale image
    pub fn decode(&self, gray: GrayImage) -> Result<DecodedResult> {
        let mut prepared = rqrr::PreparedImage::prepare(gray);
        let grids = prepared.detect_grids();
        if grids.is_empty() {
            return Err(Error::NoQrCodeFound);
        }

        let mut last_error = None;
        for grid in &grids {
            let mut raw = Vec::new();
            match grid.decode_to(&mut raw) {
                Ok(meta) => {
                    tracing::trace!(version = meta.version.0, ecc = meta.ecc_level, "QR grid decoded");
                    return Ok(DecodedResult {
                        payload: String::from_utf8_lossy(&raw).into_owned(),
                        bounding_polygon: grid.bounds.iter().map(|p| Point::new(p.x, p.y)).collect(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(Error::QrDecode(format!(
            "{} candidate grid(s), none decodable: {}",
            grids.len(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Look for a symbol in `frame`, drawing the overlay on a hit
    pub fn detect(&self, frame: &mut Frame) -> Option<DecodedResult> {
        let gray = image::imageops::grayscale(frame);

        match self.decode(gray) {
            Ok(result) => {
                if self.annotate {
                    annotate(frame, &result);
                }
                Some(result)
            }
            Err(Error::NoQrCodeFound) => None,
            Err(e) => {
                tracing::debug!(error = %e, "QR decode failed");
                None
            }
        }
    }
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Outline the symbol and print its payload just above it
pub fn annotate(frame: &mut Frame, result: &DecodedResult) {
    let points = &result.bounding_polygon;
    if points.is_empty() {
        return;
    }

    if overlay::is_convex_quad(points) {
        overlay::draw_polygon(frame, points, GREEN, OUTLINE_THICKNESS);
    } else {
        let hull = overlay::convex_hull(points);
        overlay::draw_polygon(frame, &hull, GREEN, OUTLINE_THICKNESS);
    }

    let left = points.iter().map(|p| p.x).min().unwrap_or(0);
    let top = points.iter().map(|p| p.y).min().unwrap_or(0);
    let label_height = 7 * LABEL_SCALE as i32;
    let y = (top - LABEL_GAP - label_height).max(0);
    overlay::draw_text(frame, left.max(0), y, &result.payload, GREEN, LABEL_SCALE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use qrcode::{Color, QrCode};

    /// Render `payload` as a QR symbol with a quiet zone, 4 px per module
    fn qr_frame(payload: &[u8]) -> Frame {
        let code = QrCode::new(payload).unwrap();
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let scale = 4;
        let quiet = 4 * scale;
        let side = modules * scale + quiet * 2;

        let gray = GrayImage::from_fn(side, side, |x, y| {
            if x < quiet || y < quiet || x >= side - quiet || y >= side - quiet {
                return Luma([255]);
            }
            let mx = (x - quiet) / scale;
            let my = (y - quiet) / scale;
            match colors[(my * modules + mx) as usize] {
                Color::Dark => Luma([0]),
                Color::Light => Luma([255]),
            }
        });

        // Pad into a larger frame so there is room for the label
        let mut frame = Frame::from_pixel(side + 80, side + 80, Rgb([255, 255, 255]));
        for (x, y, px) in gray.enumerate_pixels() {
            frame.put_pixel(x + 40, y + 40, Rgb([px.0[0]; 3]));
        }
        frame
    }

    #[test]
    fn test_decodes_payload_and_corners() {
        let detector = QrDetector::without_overlay();
        let mut frame = qr_frame(b"TICKET-42");
        let result = detector.detect(&mut frame).expect("QR code");
        assert_eq!(result.payload, "TICKET-42");
        assert_eq!(result.bounding_polygon.len(), 4);
    }

    #[test]
    fn test_overlay_is_drawn_on_hit() {
        let detector = QrDetector::new();
        let mut frame = qr_frame(b"hello");
        let before = frame.clone();
        assert!(detector.detect(&mut frame).is_some());
        assert_ne!(frame, before);
        assert!(frame.pixels().any(|p| *p == GREEN));
    }

    #[test]
    fn test_blank_frame_has_no_result() {
        let detector = QrDetector::new();
        let mut frame = Frame::from_pixel(64, 64, Rgb([255, 255, 255]));
        let before = frame.clone();
        assert!(detector.detect(&mut frame).is_none());
        assert_eq!(frame, before);
    }

    #[test]
    fn test_decode_reports_missing_symbol() {
        let detector = QrDetector::new();
        let gray = GrayImage::from_pixel(32, 32, Luma([255]));
        assert!(matches!(detector.decode(gray), Err(Error::NoQrCodeFound)));
    }

    #[test]
    fn test_non_utf8_payload_is_lossy() {
        let detector = QrDetector::without_overlay();
        let mut frame = qr_frame(&[0x41, 0xff, 0x42]);
        let result = detector.detect(&mut frame).expect("QR code");
        assert!(result.payload.starts_with('A'));
        assert!(result.payload.ends_with('B'));
    }

    #[test]
    fn test_degenerate_polygon_uses_hull() {
        let mut frame = Frame::new(40, 40);
        let result = DecodedResult {
            payload: String::new(),
            // bow-tie ordering
            bounding_polygon: vec![
                Point::new(5, 5),
                Point::new(30, 30),
                Point::new(30, 5),
                Point::new(5, 30),
            ],
        };
        annotate(&mut frame, &result);
        // hull edges run along the square's sides
        assert_eq!(*frame.get_pixel(17, 5), GREEN);
        assert_eq!(*frame.get_pixel(5, 17), GREEN);
    }
}
