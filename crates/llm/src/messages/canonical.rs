//! The canonical Chat Completions pivot.
//!
//! Every inbound dialect (OpenAI Chat Completions, OpenAI Responses,
//! Anthropic Messages) is normalized into [`ChatRequest`] before the proxy
//! talks to the upstream, and every upstream result is assembled into
//! [`AssembledResult`] before a dialect-specific response builder turns it
//! back into the caller's dialect. Nothing downstream of this module needs
//! to know which dialect originated the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized Chat Completions request, ready to be serialized and sent
/// to the upstream with `stream` forced to `true`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier, taken verbatim from the caller's request.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<Message>,
    /// Always `true` when serialized for the upstream — the proxy always
    /// streams upstream and buffers locally when the caller didn't ask for
    /// a stream.
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "top_p", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Stop>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Not part of the wire format: what [`ChatRequest::echo_content`] should
    /// answer with in echo mode. Every dialect normalizer sets this.
    #[serde(skip)]
    pub echo_source: EchoSource,
}

impl ChatRequest {
    /// A bare request with no optional fields set, `stream` defaulted to
    /// `true`. Dialect normalizers build on top of this.
    pub fn new(model: String, messages: Vec<Message>) -> Self {
        Self {
            model,
            messages,
            stream: true,
            temperature: None,
            top_p: None,
            max_tokens: None,
            parallel_tool_calls: None,
            stop: None,
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            echo_source: EchoSource::Messages,
        }
    }

    /// Best-effort echo-mode answer: the raw `input` value verbatim for
    /// dialects that carry one (a string is used as-is, anything else is
    /// JSON-stringified), or the
    /// JSON-stringified canonical messages array for dialects that only
    /// ever had a `messages` list to begin with.
    pub fn echo_content(&self) -> String {
        match &self.echo_source {
            EchoSource::RawValue(Value::String(text)) => text.clone(),
            EchoSource::RawValue(other) => other.to_string(),
            EchoSource::Messages => serde_json::to_string(&self.messages).unwrap_or_default(),
        }
    }
}

/// What echo mode should answer with, per dialect. See
/// [`ChatRequest::echo_content`].
#[derive(Debug, Clone)]
pub enum EchoSource {
    /// The caller's raw `input` value (OpenAI Responses dialect).
    RawValue(Value),
    /// No raw `input` field exists for this dialect; echo the canonical
    /// messages array instead (Chat Completions, Anthropic Messages).
    Messages,
}

impl Default for EchoSource {
    fn default() -> Self {
        EchoSource::Messages
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the assistant. `arguments` is an opaque JSON
/// string: it is accumulated verbatim across stream deltas and never
/// re-parsed unless a dialect conversion demands it (Anthropic `input` is
/// a parsed object, not a string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallKind {
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ToolCallKind::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A function tool definition offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: ToolCallKind,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// `stop` / `stop_sequences`: either a single string or a list of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stop {
    One(String),
    Many(Vec<String>),
}

/// `tool_choice`: a named mode, or a forced specific function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Function { function: FunctionChoiceName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionChoiceName {
    pub name: String,
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function {
            function: FunctionChoiceName { name: name.into() },
        }
    }
}

/// `response_format`: absent, `json_object`, or `json_schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseFormat {
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// What the proxy assembled from an upstream Chat Completions response,
/// whether it arrived as a single SSE stream (see [`crate::sse`]) or as one
/// buffered JSON object. Every dialect's non-streaming response builder
/// starts from this shape.
#[derive(Debug, Clone, Default)]
pub struct AssembledResult {
    pub assistant_text: String,
    pub reasoning_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
    pub usage: Option<Value>,
    pub finish_reason: Option<String>,
}
