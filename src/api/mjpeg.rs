//! `multipart/x-mixed-replace` response for browser `<img>` tags

use crate::stream::{BOUNDARY, FrameFeed};
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Stream `feed` to the client until it stops or the client goes away
pub fn response(feed: FrameFeed) -> Response {
    let body = Body::from_stream(feed.into_stream());

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build MJPEG response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
