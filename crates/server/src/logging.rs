//! Per-request access logging.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Logs method, path, status, and latency for every request that reaches the
/// router, including ones auth rejects — this layer sits outermost so it
/// sees the response either way.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::debug!("{method} {path} {} {:?}", response.status(), started.elapsed());

    response
}
