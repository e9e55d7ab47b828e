//! Error types for qrfeed operations

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type alias using qrfeed's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for qrfeed operations
#[derive(Error, Debug)]
pub enum Error {
    /// Camera-related errors
    #[error("Camera error: {0}")]
    Camera(String),

    /// Camera device not found, or nothing to select
    #[error("{0}")]
    CameraNotFound(String),

    /// Every configured backend failed to open the device
    #[error("Failed to open camera {index}: {reason}")]
    CameraOpen {
        /// Requested device index
        index: usize,
        /// Failure reported by the last backend tried
        reason: String,
    },

    /// No camera is currently active
    #[error("Camera is not active")]
    CameraInactive,

    /// Failed to capture frame from camera
    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    /// QR code decoding failed
    #[error("Failed to decode QR code: {0}")]
    QrDecode(String),

    /// No QR code found in frame
    #[error("No QR code found in frame")]
    NoQrCodeFound,

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Other(format!("Blocking task failed: {}", e))
    }
}

impl Error {
    /// HTTP status reported for this error by the API layer
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::CameraNotFound(_) => StatusCode::NOT_FOUND,
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        tracing::warn!(status = %status, message = %message, "Request error");

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err = Error::CameraNotFound("No cameras available".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "No cameras available");
    }

    #[test]
    fn test_open_failure_maps_to_500() {
        let err = Error::CameraOpen {
            index: 2,
            reason: "busy".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Failed to open camera 2: busy");
    }
}
