//! HTTP surface of the scanner service
//!
//! Handlers are thin: they extract the request, call into
//! [`CameraService`](crate::service::CameraService), and map
//! [`Error`](crate::Error) to a JSON `{"error": ...}` reply.

mod mjpeg;
pub mod routes;

use crate::config::{MetricsFormat, ServerOptions};
use crate::service::CameraService;
use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Camera controller and last-result cache
    pub service: Arc<CameraService>,
    /// Rendering used by `/metrics`
    pub metrics_format: MetricsFormat,
}

impl AppState {
    /// Wrap a service with the default JSON metrics rendering
    pub fn new(service: Arc<CameraService>) -> Self {
        Self {
            service,
            metrics_format: MetricsFormat::Json,
        }
    }

    /// Select the `/metrics` format
    pub fn with_metrics_format(mut self, format: MetricsFormat) -> Self {
        self.metrics_format = format;
        self
    }
}

/// Build the application router
pub fn router(state: AppState, server: &ServerOptions) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/video_feed", get(routes::video_feed))
        .route("/qr_result", get(routes::qr_result))
        .route("/start_camera", post(routes::start_camera))
        .route("/stop_camera", post(routes::stop_camera))
        .route("/switch_camera", post(routes::switch_camera))
        .route("/available_cameras", get(routes::available_cameras))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics_report))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}
