//! OpenAI Responses dialect: a structured `input` array instead of a flat
//! message list, and a structured `output` array instead of a single
//! `message` choice. Normalization flattens `input` into canonical
//! messages; the builder re-inflates an assembled result back into the
//! `output` shape, recovering embedded JSON when the caller asked for
//! `json_object` formatting.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::{LlmError, LlmResult},
    json_recovery,
    messages::canonical::{
        ChatRequest, EchoSource, FunctionDef, Message, ResponseFormat, Role, Tool, ToolCallKind, ToolChoice,
    },
    util::unix_timestamp,
};

use super::canonical::AssembledResult;

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(default)]
    pub input: Option<ResponsesInput>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_output_tokens: Option<u64>,
    #[serde(default)]
    pub tools: Vec<ResponsesTool>,
    pub tool_choice: Option<ResponsesToolChoice>,
    pub text: Option<ResponsesText>,
    pub parallel_tool_calls: Option<bool>,
    pub store: Option<bool>,
    pub previous_response_id: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<ResponsesInputItem>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesInputItem {
    Message { role: String, content: ResponsesContent },
    FunctionCall { call_id: String, name: String, arguments: String },
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesContent {
    Text(String),
    Parts(Vec<ResponsesContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl ResponsesContent {
    fn into_text(self) -> String {
        match self {
            ResponsesContent::Text(text) => text,
            ResponsesContent::Parts(parts) => parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesToolChoice {
    Mode(String),
    Function { #[serde(rename = "type")] kind: String, name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesText {
    pub format: Option<ResponsesFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesFormat {
    Text,
    JsonObject,
    JsonSchema { name: String, schema: Option<Value>, #[serde(default)] strict: bool },
}

/// The subset of the original request the non-streaming output envelope
/// echoes back verbatim. Captured before `into_canonical`
/// consumes the request, since normalization only keeps what the upstream
/// needs and drops everything else.
#[derive(Debug, Clone)]
pub struct ResponsesEcho {
    pub instructions: Option<String>,
    pub max_output_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub tool_choice: Option<ResponsesToolChoice>,
    pub tools: Vec<ResponsesTool>,
    pub text: Option<ResponsesText>,
    pub parallel_tool_calls: Option<bool>,
    pub store: Option<bool>,
    pub previous_response_id: Option<String>,
    pub metadata: Option<Value>,
}

impl From<&ResponsesRequest> for ResponsesEcho {
    fn from(request: &ResponsesRequest) -> Self {
        Self {
            instructions: request.instructions.clone(),
            max_output_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            tool_choice: request.tool_choice.clone(),
            tools: request.tools.clone(),
            text: request.text.clone(),
            parallel_tool_calls: request.parallel_tool_calls,
            store: request.store,
            previous_response_id: request.previous_response_id.clone(),
            metadata: request.metadata.clone(),
        }
    }
}

impl ResponsesRequest {
    /// Normalize into the canonical pivot. `input` is required and
    /// must contain at least one usable item once flattened.
    pub fn into_canonical(self) -> LlmResult<ChatRequest> {
        let Some(input) = self.input else {
            return Err(LlmError::InvalidRequest("input is required".to_string()));
        };

        let echo_source = match &input {
            ResponsesInput::Text(text) => EchoSource::RawValue(Value::String(text.clone())),
            ResponsesInput::Items(_) => EchoSource::RawValue(serde_json::to_value(&input).unwrap_or(Value::Null)),
        };

        let mut messages = Vec::new();
        if let Some(instructions) = self.instructions {
            messages.push(Message::system(instructions));
        }

        match input {
            ResponsesInput::Text(text) => messages.push(Message::user(text)),
            ResponsesInput::Items(items) => {
                for item in items {
                    messages.push(item_into_message(item)?);
                }
            }
        }

        if messages.is_empty() {
            return Err(LlmError::InvalidRequest("input must contain at least one item".to_string()));
        }

        let tools = self
            .tools
            .into_iter()
            .map(|tool| Tool {
                kind: ToolCallKind::Function,
                function: FunctionDef {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.parameters,
                },
            })
            .collect();

        let tool_choice = self.tool_choice.map(|choice| match choice {
            ResponsesToolChoice::Mode(mode) => match mode.as_str() {
                "required" => ToolChoice::Mode(crate::messages::canonical::ToolChoiceMode::Required),
                "none" => ToolChoice::Mode(crate::messages::canonical::ToolChoiceMode::None),
                _ => ToolChoice::Mode(crate::messages::canonical::ToolChoiceMode::Auto),
            },
            ResponsesToolChoice::Function { name, .. } => ToolChoice::function(name),
        });

        let response_format = self.text.and_then(|text| text.format).and_then(|format| match format {
            ResponsesFormat::Text => None,
            ResponsesFormat::JsonObject => Some(ResponseFormat::JsonObject),
            ResponsesFormat::JsonSchema { name, schema, strict } => {
                Some(ResponseFormat::JsonSchema {
                    json_schema: crate::messages::canonical::JsonSchemaFormat { name, strict, schema },
                })
            }
        });

        Ok(ChatRequest {
            model: self.model,
            messages,
            stream: true,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_output_tokens,
            parallel_tool_calls: None,
            stop: None,
            tools,
            tool_choice,
            response_format,
            echo_source,
        })
    }
}

fn item_into_message(item: ResponsesInputItem) -> LlmResult<Message> {
    Ok(match item {
        ResponsesInputItem::Message { role, content } => {
            let text = content.into_text();
            match role.as_str() {
                "system" | "developer" => Message::system(text),
                "assistant" => Message::assistant(text),
                "user" => Message::user(text),
                other => return Err(LlmError::InvalidRequest(format!("unsupported input role '{other}'"))),
            }
        }
        ResponsesInputItem::FunctionCall { call_id, name, arguments } => Message {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(vec![crate::messages::canonical::ToolCall::new(call_id, name, arguments)]),
            tool_call_id: None,
        },
        ResponsesInputItem::FunctionCallOutput { call_id, output } => Message::tool(call_id, output),
    })
}

/// Build the `output` envelope for a completed Response. When the
/// caller asked for `json_object` formatting, this tries to recover a
/// clean JSON value out of the assistant's free text first — upstream
/// models don't always respect instructions to emit *only* JSON.
///
/// `echo` carries the subset of the original request this dialect echoes
/// back verbatim, defaulted when the caller left a field
/// unset (`temperature`/`top_p` default to `1`, `parallel_tool_calls` and
/// `store` default to `true`, `tool_choice` defaults to `"auto"`, `text`
/// defaults to the plain-text format, `metadata` defaults to `{}`).
pub fn build_response(requested_model: &str, echo: &ResponsesEcho, result: AssembledResult, wants_json_object: bool) -> Value {
    let model = if result.model.is_empty() { requested_model.to_string() } else { result.model };

    let assistant_text = if wants_json_object {
        json_recovery::recover(&result.assistant_text)
            .map(|value| value.to_string())
            .unwrap_or(result.assistant_text)
    } else {
        result.assistant_text
    };

    let mut output = Vec::new();

    if !assistant_text.is_empty() {
        output.push(json!({
            "type": "message",
            "id": format!("msg-{}", Uuid::new_v4()),
            "status": "completed",
            "role": "assistant",
            "content": [{"type": "output_text", "text": assistant_text, "annotations": []}],
        }));
    }

    for tool_call in &result.tool_calls {
        output.push(json!({
            "type": "function_call",
            "call_id": tool_call.id,
            "name": tool_call.function.name,
            "arguments": tool_call.function.arguments,
        }));
    }

    let usage = result.usage.unwrap_or_else(|| {
        let output_tokens = crate::token_counter::estimate(&assistant_text);
        json!({"input_tokens": 0, "output_tokens": output_tokens, "total_tokens": output_tokens})
    });

    let tool_choice = match &echo.tool_choice {
        None => json!("auto"),
        Some(ResponsesToolChoice::Mode(mode)) => json!(mode),
        Some(ResponsesToolChoice::Function { kind, name }) => json!({"type": kind, "name": name}),
    };

    let text = echo
        .text
        .clone()
        .unwrap_or(ResponsesText { format: Some(ResponsesFormat::Text) });

    json!({
        "id": format!("resp-{}", Uuid::new_v4()),
        "object": "response",
        "created_at": unix_timestamp(),
        "status": "completed",
        "error": Value::Null,
        "incomplete_details": Value::Null,
        "instructions": echo.instructions,
        "max_output_tokens": echo.max_output_tokens,
        "model": model,
        "output": output,
        "output_text": assistant_text,
        "parallel_tool_calls": echo.parallel_tool_calls.unwrap_or(true),
        "previous_response_id": echo.previous_response_id,
        "reasoning": {"effort": Value::Null, "summary": Value::Null},
        "store": echo.store.unwrap_or(true),
        "temperature": echo.temperature.unwrap_or(1.0),
        "text": text,
        "tool_choice": tool_choice,
        "tools": echo.tools,
        "top_p": echo.top_p.unwrap_or(1.0),
        "truncation": "disabled",
        "usage": usage,
        "user": Value::Null,
        "metadata": echo.metadata.clone().unwrap_or_else(|| json!({})),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(input: Option<ResponsesInput>) -> ResponsesRequest {
        ResponsesRequest {
            model: "custom-llm".to_string(),
            input,
            instructions: None,
            stream: false,
            temperature: None,
            top_p: None,
            max_output_tokens: None,
            tools: Vec::new(),
            tool_choice: None,
            text: None,
            parallel_tool_calls: None,
            store: None,
            previous_response_id: None,
            metadata: None,
        }
    }

    #[test]
    fn missing_input_is_a_validation_error() {
        let request = base_request(None);
        assert!(matches!(request.into_canonical(), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn plain_string_input_becomes_a_user_message() {
        let mut request = base_request(Some(ResponsesInput::Text("hello".to_string())));
        request.instructions = Some("be terse".to_string());

        let canonical = request.into_canonical().unwrap();
        assert_eq!(canonical.messages.len(), 2);
        assert_eq!(canonical.messages[0].role, Role::System);
        assert_eq!(canonical.messages[1].role, Role::User);
    }

    #[test]
    fn json_object_format_recovers_embedded_json() {
        let result = AssembledResult {
            assistant_text: "here you go: {\"a\":1} thanks".to_string(),
            model: "custom-llm".to_string(),
            ..Default::default()
        };

        let echo = ResponsesEcho::from(&base_request(None));
        let response = build_response("custom-llm", &echo, result, true);
        assert_eq!(response["output"][0]["content"][0]["text"], "{\"a\":1}");
        assert_eq!(response["output_text"], "{\"a\":1}");
    }

    #[test]
    fn absent_fields_fall_back_to_documented_defaults() {
        let result = AssembledResult {
            assistant_text: "hi".to_string(),
            model: "custom-llm".to_string(),
            ..Default::default()
        };

        let echo = ResponsesEcho::from(&base_request(None));
        let response = build_response("custom-llm", &echo, result, false);

        assert_eq!(response["temperature"], 1.0);
        assert_eq!(response["top_p"], 1.0);
        assert_eq!(response["parallel_tool_calls"], true);
        assert_eq!(response["store"], true);
        assert_eq!(response["tool_choice"], "auto");
        assert_eq!(response["text"]["format"]["type"], "text");
        assert_eq!(response["metadata"], json!({}));
        assert_eq!(response["truncation"], "disabled");
        assert!(response["id"].as_str().unwrap().starts_with("resp-"));
    }

    #[test]
    fn echoed_request_fields_pass_through_unchanged() {
        let mut request = base_request(Some(ResponsesInput::Text("hi".to_string())));
        request.instructions = Some("be terse".to_string());
        request.metadata = Some(json!({"trace_id": "abc"}));
        request.previous_response_id = Some("resp-earlier".to_string());

        let echo = ResponsesEcho::from(&request);
        let response = build_response("custom-llm", &echo, AssembledResult::default(), false);

        assert_eq!(response["instructions"], "be terse");
        assert_eq!(response["metadata"], json!({"trace_id": "abc"}));
        assert_eq!(response["previous_response_id"], "resp-earlier");
    }
}
