//! The translation engine: normalizes all three inbound dialects into one
//! canonical Chat Completions request, talks to the configured upstream (or
//! synthesizes an echo-mode answer when none is configured), assembles the
//! result, and builds dialect-specific responses.

mod anthropic_stream;
pub mod error;
pub mod json_recovery;
pub mod messages;
pub mod sse;
pub mod token_counter;
pub mod upstream;
mod util;

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use axum_serde::Sonic;
use config::Config;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use uuid::Uuid;

pub use error::{AnthropicResult, LlmError, LlmResult};
use messages::{anthropic, canonical::ChatRequest, openai, responses};
use upstream::Upstream;

/// Shared state behind every handler: the resolved upstream (or none, for
/// echo mode), the model list the `/v1/models` endpoints advertise, and the
/// service identity reported by `/`, `/v1`, and `/health`.
pub struct Engine {
    upstream: Upstream,
    models: Vec<String>,
    service_name: String,
    service_version: String,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Self {
            upstream: Upstream::new(config.custom_llm_url.as_deref(), config.custom_llm_key.clone()),
            models: config.models.clone(),
            service_name: config.service_name.clone(),
            service_version: config.service_version.clone(),
        }
    }

    fn default_model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or("custom-llm")
    }

    /// Run one request to completion and return the assembled result,
    /// whether that means talking to a real upstream or synthesizing an
    /// echo-mode answer.
    async fn complete(&self, request: ChatRequest) -> LlmResult<canonical::AssembledResult> {
        match &self.upstream {
            Upstream::Echo => Ok(echo_result(&request, self.default_model())),
            Upstream::Configured { client, chat_completions_url, api_key: _, .. } => {
                let response = send(client, chat_completions_url, &self.upstream, &request).await?;
                assemble_upstream_response(response).await
            }
        }
    }

    /// Run one request as a stream of Chat-Completions-shaped JSON chunks,
    /// whether they came from the real upstream's SSE stream or were
    /// synthesized for echo mode. Every consumer (the Chat Completions
    /// passthrough handler and the Anthropic projector) folds the same
    /// chunk shape.
    async fn stream_chunks(
        &self,
        request: ChatRequest,
    ) -> LlmResult<std::pin::Pin<Box<dyn Stream<Item = Value> + Send>>> {
        match &self.upstream {
            Upstream::Echo => {
                let result = echo_result(&request, self.default_model());
                let chunks = echo_chunks(result);
                Ok(Box::pin(futures::stream::iter(chunks)))
            }
            Upstream::Configured { client, chat_completions_url, .. } => {
                let response = send(client, chat_completions_url, &self.upstream, &request).await?;
                let stream = response
                    .bytes_stream()
                    .eventsource()
                    .filter_map(|event| async move {
                        let event = event.ok()?;
                        if event.data == "[DONE]" {
                            return None;
                        }
                        serde_json::from_str::<Value>(&event.data).ok()
                    });
                Ok(Box::pin(stream))
            }
        }
    }

    /// `GET /v1/models`: proxy to the upstream's own model list when one is
    /// configured, otherwise synthesize a list from the configured models.
    async fn models_response(&self) -> LlmResult<Value> {
        match &self.upstream {
            Upstream::Echo => Ok(local_models_response(&self.models, &self.service_name)),
            Upstream::Configured { client, models_url, .. } => {
                let mut builder = client.get(models_url);
                for (name, value) in self.upstream.auth_headers() {
                    builder = builder.header(name, value);
                }

                let response = builder.send().await.map_err(|e| LlmError::Transport(e.to_string()))?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    return Err(LlmError::Upstream { status, message });
                }

                response.json().await.map_err(|e| LlmError::Transport(e.to_string()))
            }
        }
    }
}

fn local_models_response(models: &[String], service_name: &str) -> Value {
    let created = util::unix_timestamp();
    json!({
        "object": "list",
        "data": models.iter().map(|id| json!({
            "id": id,
            "object": "model",
            "created": created,
            "owned_by": service_name,
        })).collect::<Vec<_>>(),
    })
}

use eventsource_stream::Eventsource;
use messages::canonical;

async fn send(
    client: &reqwest::Client,
    url: &str,
    upstream: &Upstream,
    request: &ChatRequest,
) -> LlmResult<reqwest::Response> {
    let mut builder = client.post(url).json(request);
    for (name, value) in upstream.auth_headers() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(|e| LlmError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(LlmError::Upstream { status, message });
    }

    Ok(response)
}

async fn assemble_upstream_response(response: reqwest::Response) -> LlmResult<canonical::AssembledResult> {
    let is_event_stream = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));

    if is_event_stream {
        sse::assemble_stream(response).await
    } else {
        let body = response.bytes().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        sse::assemble_buffered(&body)
    }
}

/// Synthesize an assembled result with no upstream configured: the
/// assistant's answer is the request's own echo content (see
/// [`ChatRequest::echo_content`]), and usage is left unset so each dialect's
/// response builder fills in its own advisory estimate from that same text
/// — builders already do this for any upstream that omits `usage`, and
/// reusing that path keeps the output field names (`prompt_tokens` vs.
/// `output_tokens`) correct per dialect instead of fixing one shape here.
fn echo_result(request: &ChatRequest, default_model: &str) -> canonical::AssembledResult {
    canonical::AssembledResult {
        assistant_text: request.echo_content(),
        reasoning_text: String::new(),
        tool_calls: Vec::new(),
        model: if request.model.is_empty() { default_model.to_string() } else { request.model.clone() },
        usage: None,
        finish_reason: Some("stop".to_string()),
    }
}

/// Turn an echo-mode result into the same chunk shape a real streamed
/// upstream would produce: one delta carrying the whole text, one chunk
/// carrying `finish_reason`.
fn echo_chunks(result: canonical::AssembledResult) -> Vec<Value> {
    vec![
        json!({
            "model": result.model,
            "choices": [{"delta": {"content": result.assistant_text}}],
        }),
        json!({
            "choices": [{"delta": {}, "finish_reason": result.finish_reason}],
            "usage": result.usage,
        }),
    ]
}

pub async fn router(config: &Config) -> Router {
    let engine = Arc::new(Engine::new(config));

    Router::new()
        .route("/", get(root).head(empty_ok))
        .route("/health", get(health))
        .route("/v1", get(root).head(empty_ok))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(responses_endpoint))
        .route("/v1/messages", post(messages_endpoint))
        .with_state(engine)
}

async fn root(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": engine.service_name, "version": engine.service_version}))
}

async fn empty_ok() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

async fn health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(json!({"ok": true, "service": engine.service_name}))
}

async fn list_models(State(engine): State<Arc<Engine>>) -> LlmResult<Response> {
    Ok(Json(engine.models_response().await?).into_response())
}

/// Attach the `X-Accel-Buffering: no` header so a
/// reverse proxy in front of this service doesn't buffer the stream behind
/// its own response buffering.
fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let mut response = Sse::new(stream).into_response();
    response
        .headers_mut()
        .insert("x-accel-buffering", axum::http::HeaderValue::from_static("no"));
    response
}

async fn chat_completions(
    State(engine): State<Arc<Engine>>,
    Sonic(request): Sonic<openai::ChatCompletionsRequest>,
) -> LlmResult<Response> {
    log::debug!("chat completions request for model {}, stream={}", request.model, request.stream);

    let wants_stream = request.stream;
    let requested_model = request.model.clone();
    let canonical_request = request.into_canonical()?;

    if wants_stream {
        let chunks = engine.stream_chunks(canonical_request).await?;
        // Every chunk is passed through unchanged except `id`, which is
        // rewritten to one locally-generated id shared by the whole stream
        // consistent across it.
        let chat_id = format!("chatcmpl-{}", Uuid::new_v4());
        let event_stream = chunks
            .map(move |mut chunk| {
                if let Value::Object(fields) = &mut chunk {
                    fields.insert("id".to_string(), json!(chat_id));
                }
                chunk
            })
            .map(|chunk| Event::default().data(chunk.to_string()))
            .map(Ok::<_, Infallible>)
            .chain(futures::stream::once(async { Ok(Event::default().data("[DONE]")) }));

        Ok(sse_response(event_stream))
    } else {
        let result = engine.complete(canonical_request).await?;
        Ok(Json(openai::build_response(&requested_model, result)).into_response())
    }
}

async fn responses_endpoint(
    State(engine): State<Arc<Engine>>,
    Sonic(request): Sonic<responses::ResponsesRequest>,
) -> LlmResult<Response> {
    let requested_model = request.model.clone();
    let wants_json_object =
        matches!(request.text.as_ref().and_then(|t| t.format.as_ref()), Some(responses::ResponsesFormat::JsonObject));
    let echo = responses::ResponsesEcho::from(&request);
    let canonical_request = request.into_canonical()?;

    let result = engine.complete(canonical_request).await?;
    Ok(Json(responses::build_response(&requested_model, &echo, result, wants_json_object)).into_response())
}

async fn messages_endpoint(
    State(engine): State<Arc<Engine>>,
    Sonic(request): Sonic<anthropic::MessagesRequest>,
) -> AnthropicResult<Response> {
    let wants_stream = request.stream;
    let requested_model = request.model.clone();
    let canonical_request = request.into_canonical().map_err(Into::<error::AnthropicErrorResponse>::into)?;

    if wants_stream {
        let chunks = engine
            .stream_chunks(canonical_request)
            .await
            .map_err(Into::<error::AnthropicErrorResponse>::into)?;

        let message_id = format!("msg_{}", Uuid::new_v4());
        let projector = Arc::new(std::sync::Mutex::new(anthropic_stream::ProjectorState::new(message_id, requested_model)));

        let body_projector = projector.clone();
        let body_events = chunks.flat_map(move |chunk| {
            let events = body_projector.lock().expect("projector lock poisoned").step(&chunk);
            futures::stream::iter(events)
        });

        let tail_projector = projector.clone();
        let tail_events = futures::stream::once(async move {
            futures::stream::iter(tail_projector.lock().expect("projector lock poisoned").finish())
        })
        .flatten();

        let event_stream = body_events.chain(tail_events).map(|event| {
            let kind = anthropic_event_type(&event);
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok::<_, Infallible>(Event::default().event(kind).data(data))
        });

        let mut response = Sse::new(event_stream).into_response();
        response
            .headers_mut()
            .insert("x-accel-buffering", axum::http::HeaderValue::from_static("no"));
        Ok(response)
    } else {
        let result = engine.complete(canonical_request).await.map_err(Into::<error::AnthropicErrorResponse>::into)?;
        Ok(Json(anthropic::build_response(&requested_model, result)).into_response())
    }
}

fn anthropic_event_type(event: &anthropic_stream::AnthropicStreamEvent) -> &'static str {
    use anthropic_stream::AnthropicStreamEvent::*;
    match event {
        MessageStart { .. } => "message_start",
        ContentBlockStart { .. } => "content_block_start",
        ContentBlockDelta { .. } => "content_block_delta",
        ContentBlockStop { .. } => "content_block_stop",
        MessageDelta { .. } => "message_delta",
        MessageStop { .. } => "message_stop",
    }
}
