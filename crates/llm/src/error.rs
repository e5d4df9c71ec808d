use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Errors the translation engine can raise, mapped to HTTP status codes and
/// dialect-specific error envelopes at the edge (see [`IntoResponse`] below
/// and [`AnthropicErrorResponse`]).
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing/invalid request body fields.
    #[error("{0}")]
    InvalidRequest(String),

    /// The upstream returned a non-2xx status. `status` is preserved
    /// verbatim when it falls in 4xx-5xx, otherwise the caller maps it to
    /// 502 when constructing this variant.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The upstream returned 2xx but the body was neither a valid SSE
    /// stream nor a parseable Chat Completion JSON object.
    #[error("upstream response was not a recognizable Chat Completions payload")]
    UpstreamShape,

    /// Socket/read failure while talking to the upstream.
    #[error("transport error: {0}")]
    Transport(String),

    /// Anything else.
    #[error("internal error")]
    Internal,
}

impl LlmError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => match *status {
                400..=599 => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::UpstreamShape => StatusCode::BAD_GATEWAY,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn anthropic_error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Upstream { .. } | Self::UpstreamShape | Self::Transport(_) => "api_error",
            Self::Internal => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Upstream { message, .. } => message.clone(),
            Self::Internal => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// OpenAI-shaped error envelope: `{"error": {"message": ...}}`.
#[derive(Debug, Serialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetails,
}

#[derive(Debug, Serialize)]
struct OpenAiErrorDetails {
    message: String,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.client_message();

        (
            status,
            Json(OpenAiErrorResponse {
                error: OpenAiErrorDetails { message },
            }),
        )
            .into_response()
    }
}

/// Anthropic-shaped error envelope: `{"type":"error","error":{"type":...,"message":...}}`.
#[derive(Debug, Serialize)]
pub struct AnthropicErrorResponse {
    #[serde(skip)]
    status: StatusCode,
    r#type: &'static str,
    error: AnthropicErrorDetails,
}

#[derive(Debug, Serialize)]
struct AnthropicErrorDetails {
    r#type: String,
    message: String,
}

impl From<LlmError> for AnthropicErrorResponse {
    fn from(error: LlmError) -> Self {
        let status = error.status_code();
        let r#type = error.anthropic_error_type();
        let message = error.client_message();

        Self {
            status,
            r#type: "error",
            error: AnthropicErrorDetails {
                r#type: r#type.to_string(),
                message,
            },
        }
    }
}

impl IntoResponse for AnthropicErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicErrorResponse>;
