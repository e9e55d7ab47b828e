//! Request handlers and their JSON reply shapes

use crate::api::{AppState, mjpeg};
use crate::camera::SwitchOutcome;
use crate::error::Result;
use crate::metrics;
use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Body accepted by `/start_camera` and `/switch_camera`
#[derive(Debug, Default, Deserialize)]
pub struct CameraRequest {
    /// Camera to open; omitted means "current" (start) or "next" (switch)
    pub camera_index: Option<usize>,
}

/// Reply to lifecycle requests that end with a camera open
#[derive(Debug, Serialize, Deserialize)]
pub struct CameraReply {
    /// Camera active after the request
    pub camera_index: usize,
    /// Human-readable outcome
    pub message: String,
}

/// Reply to `/qr_result`
#[derive(Debug, Serialize, Deserialize)]
pub struct QrResultReply {
    /// Fresh payload, or null
    pub qr_code: Option<String>,
    /// Detection time in seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// Reply to `/health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReply {
    /// Always "healthy" while the server answers
    pub status: String,
    /// Whether a camera is open
    pub camera_active: bool,
    /// Last camera index opened
    pub current_camera: usize,
    /// Cameras found by the last enumeration
    pub available_cameras: Vec<usize>,
}

pub(crate) async fn index() -> Json<Value> {
    Json(json!({
        "service": "qrfeed",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/video_feed": "GET - MJPEG video stream with QR overlay",
            "/qr_result": "GET - Last detected QR code (read once)",
            "/start_camera": "POST - Start a camera {\"camera_index\": int?}",
            "/stop_camera": "POST - Stop the active camera",
            "/switch_camera": "POST - Switch camera {\"camera_index\": int?}",
            "/available_cameras": "GET - Probe for cameras",
            "/health": "GET - Service and camera status",
            "/metrics": "GET - Stream counters"
        }
    }))
}

pub(crate) async fn video_feed(State(state): State<AppState>) -> Result<Response> {
    let feed = state.service.video_feed().await?;
    tracing::info!("Video feed client connected");
    Ok(mjpeg::response(feed))
}

pub(crate) async fn qr_result(State(state): State<AppState>) -> Json<QrResultReply> {
    let reply = match state.service.take_qr_result() {
        Some(sighting) => QrResultReply {
            qr_code: Some(sighting.payload),
            timestamp: Some(sighting.timestamp),
        },
        None => QrResultReply {
            qr_code: None,
            timestamp: None,
        },
    };
    Json(reply)
}

pub(crate) async fn start_camera(
    State(state): State<AppState>,
    body: Option<Json<CameraRequest>>,
) -> Result<Json<CameraReply>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let index = state.service.start(request.camera_index).await?;
    Ok(Json(CameraReply {
        camera_index: index,
        message: format!("Camera {index} started successfully"),
    }))
}

pub(crate) async fn stop_camera(State(state): State<AppState>) -> Result<Json<Value>> {
    let message = if state.service.stop().await? {
        "Camera stopped successfully"
    } else {
        "Camera was not active"
    };
    Ok(Json(json!({ "message": message })))
}

pub(crate) async fn switch_camera(
    State(state): State<AppState>,
    body: Option<Json<CameraRequest>>,
) -> Result<Json<CameraReply>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let reply = match state.service.switch(request.camera_index).await? {
        SwitchOutcome::Switched(index) => CameraReply {
            camera_index: index,
            message: format!("Switched to camera {index}"),
        },
        SwitchOutcome::Reverted { active, .. } => CameraReply {
            camera_index: active,
            message: format!("Failed to switch camera, reverted to camera {active}"),
        },
    };
    Ok(Json(reply))
}

pub(crate) async fn available_cameras(State(state): State<AppState>) -> Json<Value> {
    let cameras = state.service.enumerate().await;
    Json(json!({ "cameras": cameras }))
}

pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthReply>> {
    let status = state.service.status().await?;
    Ok(Json(HealthReply {
        status: "healthy".to_string(),
        camera_active: status.active,
        current_camera: status.current_index,
        available_cameras: status.available,
    }))
}

pub(crate) async fn metrics_report(State(state): State<AppState>) -> Response {
    let (content_type, body) = metrics::render(state.metrics_format);
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}
