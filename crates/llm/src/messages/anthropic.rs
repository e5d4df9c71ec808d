//! Anthropic Messages dialect: a required `max_tokens`, a `system` prompt
//! kept separate from `messages`, and content made of typed blocks (text /
//! tool_use / tool_result) rather than a plain string. Live streaming for
//! this dialect is handled by [`crate::anthropic_stream`]; this module only
//! covers request normalization and the non-streaming response
//! builder.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::{LlmError, LlmResult},
    messages::canonical::{
        ChatRequest, EchoSource, FunctionDef, Message, Role, Stop, Tool, ToolCallKind, ToolChoice, ToolChoiceMode,
    },
};

use super::canonical::AssembledResult;

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: Option<u64>,
    pub messages: Vec<AnthropicMessage>,
    pub system: Option<AnthropicSystem>,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub tools: Vec<AnthropicTool>,
    pub tool_choice: Option<AnthropicToolChoice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnthropicSystem {
    Text(String),
    Blocks(Vec<AnthropicTextBlock>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicTextBlock {
    pub text: String,
}

impl AnthropicSystem {
    fn into_text(self) -> String {
        match self {
            AnthropicSystem::Text(text) => text,
            AnthropicSystem::Blocks(blocks) => blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: ToolResultContent },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<AnthropicTextBlock>),
}

impl ToolResultContent {
    fn into_text(self) -> String {
        match self {
            ToolResultContent::Text(text) => text,
            ToolResultContent::Blocks(blocks) => blocks.into_iter().map(|b| b.text).collect::<Vec<_>>().join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnthropicToolChoice {
    Mode { #[serde(rename = "type")] kind: String },
    Specific { #[serde(rename = "type")] kind: String, name: String },
}

impl MessagesRequest {
    /// Normalize into the canonical pivot. `max_tokens` is required by
    /// the Anthropic dialect even though the canonical type treats it as
    /// optional.
    pub fn into_canonical(self) -> LlmResult<ChatRequest> {
        let max_tokens = self
            .max_tokens
            .ok_or_else(|| LlmError::InvalidRequest("max_tokens is required".to_string()))?;

        let mut messages = Vec::new();
        if let Some(system) = self.system {
            let text = system.into_text();
            if !text.is_empty() {
                messages.push(Message::system(text));
            }
        }

        for message in self.messages {
            messages.extend(message_into_canonical(message)?);
        }

        let tools = self
            .tools
            .into_iter()
            .map(|tool| Tool {
                kind: ToolCallKind::Function,
                function: FunctionDef {
                    name: tool.name,
                    description: tool.description,
                    parameters: tool.input_schema,
                },
            })
            .collect();

        let tool_choice = self.tool_choice.map(|choice| match choice {
            AnthropicToolChoice::Mode { kind } => match kind.as_str() {
                "any" => ToolChoice::Mode(ToolChoiceMode::Required),
                "none" => ToolChoice::Mode(ToolChoiceMode::None),
                _ => ToolChoice::Mode(ToolChoiceMode::Auto),
            },
            AnthropicToolChoice::Specific { name, .. } => ToolChoice::function(name),
        });

        let stop = (!self.stop_sequences.is_empty()).then_some(Stop::Many(self.stop_sequences));

        Ok(ChatRequest {
            model: self.model,
            messages,
            stream: true,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: Some(max_tokens),
            parallel_tool_calls: None,
            stop,
            tools,
            tool_choice,
            response_format: None,
            echo_source: EchoSource::Messages,
        })
    }
}

fn message_into_canonical(message: AnthropicMessage) -> LlmResult<Vec<Message>> {
    let role = match message.role.as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        other => return Err(LlmError::InvalidRequest(format!("unsupported message role '{other}'"))),
    };

    let blocks = match message.content {
        AnthropicContent::Text(text) => return Ok(vec![Message { role, content: Some(text), tool_calls: None, tool_call_id: None }]),
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text: block_text } => text.push_str(&block_text),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(crate::messages::canonical::ToolCall::new(id, name, input.to_string()));
            }
            AnthropicContentBlock::ToolResult { tool_use_id, content } => {
                tool_results.push(Message::tool(tool_use_id, content.into_text()));
            }
        }
    }

    let mut messages = Vec::new();
    if !text.is_empty() || !tool_calls.is_empty() {
        messages.push(Message {
            role,
            content: (!text.is_empty()).then_some(text),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }
    messages.extend(tool_results);

    Ok(messages)
}

/// Build a non-streaming Anthropic `message` response.
pub fn build_response(requested_model: &str, result: AssembledResult) -> Value {
    let model = if result.model.is_empty() { requested_model.to_string() } else { result.model };

    let mut content = Vec::new();
    if !result.assistant_text.is_empty() {
        content.push(json!({"type": "text", "text": result.assistant_text}));
    }
    for tool_call in &result.tool_calls {
        let input: Value = serde_json::from_str(&tool_call.function.arguments).unwrap_or_else(|_| json!({}));
        content.push(json!({
            "type": "tool_use",
            "id": tool_call.id,
            "name": tool_call.function.name,
            "input": input,
        }));
    }

    let stop_reason = match result.finish_reason.as_deref() {
        Some("length") => "max_tokens",
        Some("tool_calls") | Some("function_call") => "tool_use",
        _ => "end_turn",
    };

    // Anthropic's usage shape always uses `input_tokens`/`output_tokens`; a
    // reported Chat Completions usage object (`prompt_tokens`/
    // `completion_tokens`) is remapped, not passed through verbatim.
    let usage = match &result.usage {
        Some(usage) => json!({
            "input_tokens": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            "output_tokens": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        }),
        None => {
            let output_tokens = crate::token_counter::estimate(&result.assistant_text);
            json!({"input_tokens": 0, "output_tokens": output_tokens})
        }
    };

    json!({
        "id": format!("msg_{}", Uuid::new_v4()),
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "stop_sequence": Value::Null,
        "usage": usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(messages: Vec<AnthropicMessage>) -> MessagesRequest {
        MessagesRequest {
            model: "custom-llm".to_string(),
            max_tokens: Some(256),
            messages,
            system: None,
            stream: false,
            temperature: None,
            top_p: None,
            stop_sequences: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    #[test]
    fn missing_max_tokens_is_a_validation_error() {
        let mut request = base_request(vec![AnthropicMessage { role: "user".to_string(), content: AnthropicContent::Text("hi".to_string()) }]);
        request.max_tokens = None;

        assert!(matches!(request.into_canonical(), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn system_prompt_becomes_leading_system_message() {
        let mut request = base_request(vec![AnthropicMessage { role: "user".to_string(), content: AnthropicContent::Text("hi".to_string()) }]);
        request.system = Some(AnthropicSystem::Text("be terse".to_string()));

        let canonical = request.into_canonical().unwrap();
        assert_eq!(canonical.messages[0].role, Role::System);
        assert_eq!(canonical.messages[1].role, Role::User);
    }

    #[test]
    fn tool_result_block_becomes_a_tool_message() {
        let request = base_request(vec![AnthropicMessage {
            role: "user".to_string(),
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: "call_1".to_string(),
                content: ToolResultContent::Text("42 degrees".to_string()),
            }]),
        }]);

        let canonical = request.into_canonical().unwrap();
        assert_eq!(canonical.messages[0].role, Role::Tool);
        assert_eq!(canonical.messages[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn finish_reason_maps_to_anthropic_stop_reason() {
        let result = AssembledResult {
            assistant_text: "done".to_string(),
            model: "custom-llm".to_string(),
            finish_reason: Some("length".to_string()),
            ..Default::default()
        };

        let response = build_response("custom-llm", result);
        assert_eq!(response["stop_reason"], "max_tokens");
    }

    #[test]
    fn reported_usage_is_remapped_to_anthropic_token_names() {
        let result = AssembledResult {
            assistant_text: "done".to_string(),
            model: "custom-llm".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: Some(json!({"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14})),
            ..Default::default()
        };

        let response = build_response("custom-llm", result);
        assert_eq!(response["usage"], json!({"input_tokens": 10, "output_tokens": 4}));
    }
}
