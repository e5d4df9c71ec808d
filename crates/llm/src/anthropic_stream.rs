//! Projecting a live upstream Chat Completions stream into Anthropic
//! Messages stream events, chunk by chunk, without buffering the whole
//! response first.
//!
//! The state machine is kept as an explicit struct rather than a closure
//! over captured variables — a long-lived `match` over hidden variables is
//! much harder to read back a year later than a named struct with named
//! invariants.

use serde::Serialize;
use serde_json::Value;

/// One event in an Anthropic Messages SSE stream. Each variant serializes
/// to the Anthropic envelope for its `type`; the axum handler wraps these
/// in `event: <type>` / `data: <json>` SSE frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AnthropicStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartPayload },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: usize, content_block: ContentBlockStart },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: ContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaPayload, usage: UsagePayload },
    #[serde(rename = "message_stop")]
    MessageStop {},
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageStartPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub role: &'static str,
    pub content: Vec<()>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: UsagePayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlockStart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ContentDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeltaPayload {
    pub stop_reason: &'static str,
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct UsagePayload {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Per-tool-call bookkeeping, keyed by the upstream delta's own `index`.
struct ToolBlock {
    opened: bool,
    closed: bool,
}

/// Live projector state for one in-flight request. Text always lives at
/// content block index 0 (opened lazily, on first text delta), and tool
/// call `i` lives at index `i + 1`.
pub struct ProjectorState {
    message_id: String,
    model: String,
    sent_message_start: bool,
    text_block_open: bool,
    text_block_closed: bool,
    tool_blocks: Vec<ToolBlock>,
    output_tokens: u64,
    finished: bool,
}

impl ProjectorState {
    pub fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            model: model.into(),
            sent_message_start: false,
            text_block_open: false,
            text_block_closed: false,
            tool_blocks: Vec::new(),
            output_tokens: 0,
            finished: false,
        }
    }

    /// Fold one upstream Chat Completions chunk into zero or more Anthropic
    /// stream events.
    pub fn step(&mut self, chunk: &Value) -> Vec<AnthropicStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();

        if !self.sent_message_start {
            if let Some(model) = chunk.get("model").and_then(Value::as_str) {
                self.model = model.to_string();
            }
            events.push(AnthropicStreamEvent::MessageStart {
                message: MessageStartPayload {
                    id: self.message_id.clone(),
                    kind: "message",
                    role: "assistant",
                    content: Vec::new(),
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: UsagePayload::default(),
                },
            });
            self.sent_message_start = true;
        }

        let Some(choice) = chunk.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
            return events;
        };
        let delta = choice.get("delta");

        let content_text = delta.and_then(|d| d.get("content")).and_then(Value::as_str);
        let reasoning_text = delta.and_then(|d| d.get("reasoning_content")).and_then(Value::as_str);

        // Reasoning text is folded into the same index-0 text block as
        // ordinary content — Anthropic's stream shape has no separate
        // "thinking" block for this proxy to target.
        if (content_text.is_some() || reasoning_text.is_some()) && !self.text_block_closed {
            if !self.text_block_open {
                events.push(AnthropicStreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlockStart::Text { text: String::new() },
                });
                self.text_block_open = true;
            }

            for text in [content_text, reasoning_text].into_iter().flatten() {
                if text.is_empty() {
                    continue;
                }
                self.output_tokens += crate::token_counter::estimate(text);
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentDelta::Text { text: text.to_string() },
                });
            }
        }

        if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
            for fragment in tool_calls {
                let Some(upstream_index) = fragment.get("index").and_then(Value::as_u64) else {
                    continue;
                };
                let upstream_index = upstream_index as usize;
                let projected_index = upstream_index + 1;

                self.close_text_block(&mut events);

                while self.tool_blocks.len() <= upstream_index {
                    self.tool_blocks.push(ToolBlock { opened: false, closed: false });
                }

                if !self.tool_blocks[upstream_index].opened {
                    let id = fragment.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = fragment
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();

                    events.push(AnthropicStreamEvent::ContentBlockStart {
                        index: projected_index,
                        content_block: ContentBlockStart::ToolUse {
                            id: id.to_string(),
                            name: name.to_string(),
                            input: serde_json::json!({}),
                        },
                    });
                    self.tool_blocks[upstream_index].opened = true;
                }

                if let Some(args) = fragment
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                {
                    self.output_tokens += crate::token_counter::estimate(args);
                    events.push(AnthropicStreamEvent::ContentBlockDelta {
                        index: projected_index,
                        delta: ContentDelta::InputJson {
                            partial_json: args.to_string(),
                        },
                    });
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.close_all_blocks(&mut events);
            events.push(AnthropicStreamEvent::MessageDelta {
                delta: MessageDeltaPayload {
                    stop_reason: map_stop_reason(reason),
                    stop_sequence: None,
                },
                usage: UsagePayload {
                    input_tokens: 0,
                    output_tokens: self.output_tokens,
                },
            });
            events.push(AnthropicStreamEvent::MessageStop {});
            self.finished = true;
        }

        events
    }

    /// The upstream closed the connection without ever sending a
    /// `finish_reason`. Anthropic clients still expect a terminated stream,
    /// so this synthesizes the same closing sequence with `end_turn`.
    pub fn finish(&mut self) -> Vec<AnthropicStreamEvent> {
        if self.finished || !self.sent_message_start {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.close_all_blocks(&mut events);
        events.push(AnthropicStreamEvent::MessageDelta {
            delta: MessageDeltaPayload {
                stop_reason: "end_turn",
                stop_sequence: None,
            },
            usage: UsagePayload {
                input_tokens: 0,
                output_tokens: self.output_tokens,
            },
        });
        events.push(AnthropicStreamEvent::MessageStop {});
        self.finished = true;
        events
    }

    fn close_text_block(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        if self.text_block_open && !self.text_block_closed {
            events.push(AnthropicStreamEvent::ContentBlockStop { index: 0 });
            self.text_block_closed = true;
        }
    }

    fn close_all_blocks(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        self.close_text_block(events);
        for (upstream_index, block) in self.tool_blocks.iter_mut().enumerate() {
            if block.opened && !block.closed {
                events.push(AnthropicStreamEvent::ContentBlockStop { index: upstream_index + 1 });
                block.closed = true;
            }
        }
    }
}

fn map_stop_reason(upstream_reason: &str) -> &'static str {
    match upstream_reason {
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        _ => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_type(event: &AnthropicStreamEvent) -> &'static str {
        match event {
            AnthropicStreamEvent::MessageStart { .. } => "message_start",
            AnthropicStreamEvent::ContentBlockStart { .. } => "content_block_start",
            AnthropicStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            AnthropicStreamEvent::ContentBlockStop { .. } => "content_block_stop",
            AnthropicStreamEvent::MessageDelta { .. } => "message_delta",
            AnthropicStreamEvent::MessageStop { .. } => "message_stop",
        }
    }

    #[test]
    fn plain_text_stream_emits_balanced_start_delta_stop() {
        let mut state = ProjectorState::new("msg_1", "custom-llm");

        let mut kinds = Vec::new();
        for chunk in [
            json!({"model": "custom-llm", "choices": [{"delta": {"content": "Hi"}}]}),
            json!({"choices": [{"delta": {"content": " there"}, "finish_reason": "stop"}]}),
        ] {
            kinds.extend(state.step(&chunk).iter().map(event_type));
        }

        assert_eq!(
            kinds,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn reasoning_content_folds_into_the_same_text_block_as_content() {
        let mut state = ProjectorState::new("msg_5", "custom-llm");

        let mut kinds = Vec::new();
        for chunk in [
            json!({"model": "custom-llm", "choices": [{"delta": {"reasoning_content": "pondering"}}]}),
            json!({"choices": [{"delta": {"content": "answer"}, "finish_reason": "stop"}]}),
        ] {
            kinds.extend(state.step(&chunk).iter().map(event_type));
        }

        assert_eq!(
            kinds,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn tool_call_closes_text_block_first_and_uses_shifted_index() {
        let mut state = ProjectorState::new("msg_2", "custom-llm");

        state.step(&json!({"model": "custom-llm", "choices": [{"delta": {"content": "thinking"}}]}));
        let events = state.step(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "function": {"name": "lookup", "arguments": "{}"}}
        ]}}]}));

        let kinds: Vec<_> = events.iter().map(event_type).collect();
        assert_eq!(
            kinds,
            vec!["content_block_stop", "content_block_start", "content_block_delta"]
        );

        let AnthropicStreamEvent::ContentBlockStart { index, .. } = &events[1] else {
            panic!("expected content_block_start");
        };
        assert_eq!(*index, 1);
    }

    #[test]
    fn tool_call_event_sequence_matches_expected_shape() {
        let mut state = ProjectorState::new("msg_4", "custom-llm");
        state.step(&json!({"model": "custom-llm", "choices": [{"delta": {"content": "Let me check."}}]}));
        let events = state.step(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_1", "function": {"name": "lookup", "arguments": "{\"q\":\"rust\"}"}}
        ]}, "finish_reason": "tool_calls"}]}));

        insta::assert_json_snapshot!(events, @r#"
        [
          {
            "type": "content_block_stop",
            "index": 0
          },
          {
            "type": "content_block_start",
            "index": 1,
            "content_block": {
              "type": "tool_use",
              "id": "call_1",
              "name": "lookup",
              "input": {}
            }
          },
          {
            "type": "content_block_delta",
            "index": 1,
            "delta": {
              "type": "input_json_delta",
              "partial_json": "{\"q\":\"rust\"}"
            }
          },
          {
            "type": "content_block_stop",
            "index": 1
          },
          {
            "type": "message_delta",
            "delta": {
              "stop_reason": "tool_use",
              "stop_sequence": null
            },
            "usage": {
              "input_tokens": 0,
              "output_tokens": 7
            }
          },
          {
            "type": "message_stop"
          }
        ]
        "#);
    }

    #[test]
    fn eof_without_finish_reason_falls_back_to_end_turn() {
        let mut state = ProjectorState::new("msg_3", "custom-llm");
        state.step(&json!({"model": "custom-llm", "choices": [{"delta": {"content": "partial"}}]}));

        let events = state.finish();
        let AnthropicStreamEvent::MessageDelta { delta, .. } = &events[events.len() - 2] else {
            panic!("expected message_delta");
        };
        assert_eq!(delta.stop_reason, "end_turn");
    }
}
