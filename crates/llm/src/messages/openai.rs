//! OpenAI Chat Completions dialect: this is also the wire format the proxy
//! speaks to the upstream, so normalization is mostly a direct
//! passthrough into the canonical pivot, and the non-streaming response
//! builder is the one builder closest to a straight re-serialization.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::{LlmError, LlmResult},
    messages::canonical::{
        ChatRequest, EchoSource, FunctionChoiceName, FunctionDef, Message, ResponseFormat, Role, Stop, Tool,
        ToolCallKind, ToolChoice, ToolChoiceMode,
    },
    util::unix_timestamp,
};

use super::canonical::AssembledResult;

/// Inbound `POST /v1/chat/completions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionsMessage>,
    #[serde(default)]
    pub stream: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u64>,
    pub parallel_tool_calls: Option<bool>,
    pub stop: Option<Stop>,
    #[serde(default)]
    pub tools: Vec<ChatCompletionsTool>,
    pub tool_choice: Option<ChatCompletionsToolChoice>,
    pub response_format: Option<ResponseFormat>,
}

/// An inbound message. `content` may be a plain string or an array of
/// typed parts; parts are flattened by concatenating the `text` of any
/// part whose `type` is `"text"`, in order, with no separator.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<ChatCompletionsContent>,
    pub tool_calls: Option<Vec<crate::messages::canonical::ToolCall>>,
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatCompletionsContent {
    Text(String),
    Parts(Vec<ChatCompletionsContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl ChatCompletionsContent {
    fn into_text(self) -> String {
        match self {
            ChatCompletionsContent::Text(text) => text,
            ChatCompletionsContent::Parts(parts) => parts
                .into_iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<ChatCompletionsMessage> for Message {
    fn from(message: ChatCompletionsMessage) -> Self {
        Message {
            role: message.role,
            content: message.content.map(ChatCompletionsContent::into_text),
            tool_calls: message.tool_calls,
            tool_call_id: message.tool_call_id,
        }
    }
}

/// An inbound tool definition. Only `type: "function"` tools survive
/// normalization; any other tool type (web search, computer use, MCP, …)
/// is dropped rather than rejected, per this dialect's tool-type scope.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionsTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: Option<FunctionDef>,
}

/// `tool_choice` accepts either the canonical `{type:"function",
/// function:{name}}` shape or the flatter `{type:"function", name}` shape
/// some callers send; both normalize to the same canonical `ToolChoice`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatCompletionsToolChoice {
    Mode(ToolChoiceMode),
    Flat { name: String },
    Nested { function: FunctionChoiceName },
}

impl ChatCompletionsRequest {
    /// Normalize into the canonical pivot. The only validation this
    /// dialect needs beyond what serde already enforces is a non-empty
    /// message list.
    pub fn into_canonical(self) -> LlmResult<ChatRequest> {
        if self.messages.is_empty() {
            return Err(LlmError::InvalidRequest("messages must contain at least one message".to_string()));
        }

        let messages = self.messages.into_iter().map(Message::from).collect();

        let tools = self
            .tools
            .into_iter()
            .filter(|tool| tool.kind == "function")
            .filter_map(|tool| tool.function.map(|function| Tool { kind: ToolCallKind::Function, function }))
            .collect();

        let tool_choice = self.tool_choice.map(|choice| match choice {
            ChatCompletionsToolChoice::Mode(mode) => ToolChoice::Mode(mode),
            ChatCompletionsToolChoice::Flat { name } => ToolChoice::function(name),
            ChatCompletionsToolChoice::Nested { function } => ToolChoice::function(function.name),
        });

        Ok(ChatRequest {
            model: self.model,
            messages,
            stream: true,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            parallel_tool_calls: self.parallel_tool_calls,
            stop: self.stop,
            tools,
            tool_choice,
            response_format: self.response_format,
            echo_source: EchoSource::Messages,
        })
    }
}

/// Non-streaming `chat.completion` response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ChatCompletionMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<crate::messages::canonical::ToolCall>,
}

/// Build a `chat.completion` body from an assembled upstream result. When
/// `result.usage` wasn't reported by the upstream, usage is filled in from
/// the advisory token estimator rather than left out of the envelope.
pub fn build_response(requested_model: &str, result: AssembledResult) -> ChatCompletionResponse {
    let model = if result.model.is_empty() { requested_model.to_string() } else { result.model };
    let finish_reason = result.finish_reason.unwrap_or_else(|| {
        if result.tool_calls.is_empty() { "stop".to_string() } else { "tool_calls".to_string() }
    });

    let usage = result.usage.unwrap_or_else(|| {
        let completion_tokens = crate::token_counter::estimate(&result.assistant_text);
        json!({
            "prompt_tokens": 0,
            "completion_tokens": completion_tokens,
            "total_tokens": completion_tokens,
        })
    });

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion",
        created: unix_timestamp(),
        model,
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionMessage {
                role: "assistant",
                content: (!result.assistant_text.is_empty()).then_some(result.assistant_text),
                reasoning_content: (!result.reasoning_text.is_empty()).then_some(result.reasoning_text),
                tool_calls: result.tool_calls,
            },
            finish_reason,
        }],
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_message_list() {
        let request = ChatCompletionsRequest {
            model: "custom-llm".to_string(),
            messages: Vec::new(),
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            parallel_tool_calls: None,
            stop: None,
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
        };

        assert!(matches!(request.into_canonical(), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn forces_stream_true_for_upstream() {
        let request = ChatCompletionsRequest {
            model: "custom-llm".to_string(),
            messages: vec![ChatCompletionsMessage {
                role: Role::User,
                content: Some(ChatCompletionsContent::Text("hi".to_string())),
                tool_calls: None,
                tool_call_id: None,
            }],
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            parallel_tool_calls: None,
            stop: None,
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
        };

        let canonical = request.into_canonical().unwrap();
        assert!(canonical.stream);
        assert_eq!(canonical.messages[0].role, Role::User);
    }

    #[test]
    fn flattens_array_content_parts_to_a_single_string() {
        let request = ChatCompletionsRequest {
            model: "custom-llm".to_string(),
            messages: vec![ChatCompletionsMessage {
                role: Role::User,
                content: Some(ChatCompletionsContent::Parts(vec![
                    ChatCompletionsContentPart { kind: "text".to_string(), text: Some("Hello, ".to_string()) },
                    ChatCompletionsContentPart { kind: "image_url".to_string(), text: None },
                    ChatCompletionsContentPart { kind: "text".to_string(), text: Some("world".to_string()) },
                ])),
                tool_calls: None,
                tool_call_id: None,
            }],
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            parallel_tool_calls: None,
            stop: None,
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
        };

        let canonical = request.into_canonical().unwrap();
        assert_eq!(canonical.messages[0].content.as_deref(), Some("Hello, world"));
    }

    #[test]
    fn drops_non_function_tools_and_normalizes_flat_tool_choice() {
        let request = ChatCompletionsRequest {
            model: "custom-llm".to_string(),
            messages: vec![ChatCompletionsMessage {
                role: Role::User,
                content: Some(ChatCompletionsContent::Text("hi".to_string())),
                tool_calls: None,
                tool_call_id: None,
            }],
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            parallel_tool_calls: None,
            stop: None,
            tools: vec![
                ChatCompletionsTool { kind: "web_search".to_string(), function: None },
                ChatCompletionsTool {
                    kind: "function".to_string(),
                    function: Some(FunctionDef { name: "lookup".to_string(), description: None, parameters: None }),
                },
            ],
            tool_choice: Some(ChatCompletionsToolChoice::Flat { name: "lookup".to_string() }),
            response_format: None,
        };

        let canonical = request.into_canonical().unwrap();
        assert_eq!(canonical.tools.len(), 1);
        assert_eq!(canonical.tools[0].function.name, "lookup");
        assert!(matches!(
            canonical.tool_choice,
            Some(ToolChoice::Function { function }) if function.name == "lookup"
        ));
    }

    #[test]
    fn falls_back_to_advisory_usage_when_upstream_omits_it() {
        let result = AssembledResult {
            assistant_text: "hello".to_string(),
            model: "custom-llm".to_string(),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        };

        let response = build_response("custom-llm", result);
        assert_eq!(response.usage["completion_tokens"], 2);
    }
}
