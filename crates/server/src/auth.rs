//! Shared-secret auth: a single configured key checked against one of a
//! small set of headers, which header being acceptable depends on which
//! dialect endpoint is being called.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

#[derive(Clone)]
pub struct AuthState {
    expected_key: Option<Arc<SecretString>>,
}

impl AuthState {
    pub fn new(config: &config::Config) -> Self {
        Self {
            expected_key: config.proxy_key.clone().map(Arc::new),
        }
    }
}

/// Reject requests that don't carry the configured proxy key. When no key is
/// configured, every request passes through unchecked. Only the three
/// dialect endpoints are protected; `/`, `/v1`, `/v1/models`, and `/health`
/// are always reachable so service discovery and load balancers don't need a
/// credential.
pub async fn require_proxy_key(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let is_anthropic = path.starts_with("/v1/messages");
    let is_protected = is_anthropic || path.starts_with("/v1/responses") || path.starts_with("/v1/chat/completions");

    if !is_protected {
        return next.run(request).await;
    }

    let Some(expected) = &state.expected_key else {
        return next.run(request).await;
    };

    let key = if is_anthropic { extract_anthropic_key(request.headers()) } else { extract_proxy_key(request.headers()) };

    match key {
        Some(key) if key == expected.expose_secret() => next.run(request).await,
        _ => unauthorized(is_anthropic),
    }
}

fn extract_proxy_key(headers: &HeaderMap) -> Option<String> {
    headers.get("x-proxy-key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn extract_anthropic_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized(is_anthropic: bool) -> Response {
    let body = if is_anthropic {
        json!({"type": "error", "error": {"type": "authentication_error", "message": "Invalid API key"}})
    } else {
        json!({"error": {"message": "Unauthorized"}})
    };

    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
