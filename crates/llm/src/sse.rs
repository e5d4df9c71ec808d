//! Stream assembly and buffered-body parsing — both produce the same
//! [`AssembledResult`] regardless of how the upstream actually answered.
//!
//! Uses `eventsource-stream`'s `Eventsource` trait over
//! `reqwest::Response::bytes_stream()` for incremental SSE consumption; the
//! per-line "parse or skip" tolerance and the `[DONE]` sentinel handling
//! follow the same shape as upstream Chat Completions clients in the wild.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::Value;

use crate::{
    error::{LlmError, LlmResult},
    messages::canonical::{AssembledResult, FunctionCall, ToolCall, ToolCallKind},
};

/// Consume an upstream SSE response, folding every `data:` line into an
/// [`AssembledResult`]. Malformed lines are skipped rather than failing the
/// whole request: an upstream that occasionally emits a stray keep-alive
/// comment or half-formed line shouldn't take the response down with it.
pub async fn assemble_stream(response: reqwest::Response) -> LlmResult<AssembledResult> {
    let mut result = AssembledResult::default();
    let mut saw_any_chunk = false;
    let mut stream = response.bytes_stream().eventsource();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(_) => continue,
        };

        if event.data == "[DONE]" {
            break;
        }

        let Ok(chunk) = serde_json::from_str::<Value>(&event.data) else {
            continue;
        };

        saw_any_chunk = true;
        fold_chunk(&mut result, &chunk);
    }

    if !saw_any_chunk {
        return Err(LlmError::UpstreamShape);
    }

    Ok(result)
}

/// Parse a single buffered upstream JSON body (no SSE framing at all) into
/// the same assembled shape. Some upstreams ignore `stream: true` for small
/// requests and just answer with one Chat Completions object; this keeps
/// that case working without a second code path downstream.
pub fn assemble_buffered(body: &[u8]) -> LlmResult<AssembledResult> {
    let chunk: Value = serde_json::from_slice(body).map_err(|_| LlmError::UpstreamShape)?;

    let mut result = AssembledResult::default();
    fold_chunk(&mut result, &chunk);
    Ok(result)
}

/// Merge one upstream chunk (streamed delta or a full buffered object) into
/// the running result.
fn fold_chunk(result: &mut AssembledResult, chunk: &Value) {
    if let Some(model) = chunk.get("model").and_then(Value::as_str) {
        result.model = model.to_string();
    }
    if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
        result.usage = Some(usage.clone());
    }

    let Some(choice) = chunk.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
        return;
    };

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        result.finish_reason = Some(reason.to_string());
    }

    // A buffered, non-streamed object carries the whole answer in `message`;
    // a streamed chunk carries an incremental `delta`. Either shape is
    // folded the same way once we've picked the right field.
    let piece = choice.get("message").or_else(|| choice.get("delta"));
    let Some(piece) = piece else { return };

    if let Some(text) = piece.get("content").and_then(Value::as_str) {
        result.assistant_text.push_str(text);
    }
    // Some providers emit the same incremental text under `text` instead of
    // `content`; both are folded into the same `assistant_text`.
    if let Some(text) = piece.get("text").and_then(Value::as_str) {
        result.assistant_text.push_str(text);
    }
    if let Some(text) = piece
        .get("reasoning_content")
        .or_else(|| piece.get("reasoning"))
        .and_then(Value::as_str)
    {
        result.reasoning_text.push_str(text);
    }

    if let Some(tool_calls) = piece.get("tool_calls").and_then(Value::as_array) {
        fold_tool_calls(result, tool_calls);
    }
}

/// Tool call fragments arrive indexed by `index`, one fragment (id/name this
/// time, an argument shard next time) per delta. `tool_calls` grows densely
/// — an index can't appear without every lower index having already
/// appeared — so a plain `Vec` indexed by position is enough; padding with
/// empty placeholder calls handles a chunk that introduces a higher index
/// before a lower one has shown up in this particular delta.
///
/// A non-streaming upstream's `message.tool_calls` array carries no `index`
/// at all (every entry is already complete), so a missing `index` falls back
/// to the fragment's position in the array rather than being dropped.
fn fold_tool_calls(result: &mut AssembledResult, fragments: &[Value]) {
    for (position, fragment) in fragments.iter().enumerate() {
        let index = fragment.get("index").and_then(Value::as_u64).map(|i| i as usize).unwrap_or(position);

        while result.tool_calls.len() <= index {
            result.tool_calls.push(ToolCall {
                id: String::new(),
                kind: ToolCallKind::Function,
                function: FunctionCall {
                    name: String::new(),
                    arguments: String::new(),
                },
            });
        }

        let slot = &mut result.tool_calls[index];

        if let Some(id) = fragment.get("id").and_then(Value::as_str) {
            slot.id = id.to_string();
        }
        if let Some(function) = fragment.get("function") {
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                slot.function.name.push_str(name);
            }
            if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                slot.function.arguments.push_str(args);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buffered_object_captures_full_message() {
        let body = json!({
            "model": "custom-llm",
            "choices": [{
                "message": {"content": "hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2}
        });

        let result = assemble_buffered(body.to_string().as_bytes()).unwrap();

        assert_eq!(result.assistant_text, "hello there");
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
        assert!(result.usage.is_some());
    }

    #[test]
    fn content_deltas_concatenate_in_order() {
        let mut result = AssembledResult::default();
        for piece in ["Hel", "lo,", " world"] {
            fold_chunk(&mut result, &json!({"choices": [{"delta": {"content": piece}}]}));
        }

        assert_eq!(result.assistant_text, "Hello, world");
    }

    #[test]
    fn text_field_deltas_also_concatenate_into_assistant_text() {
        let mut result = AssembledResult::default();
        fold_chunk(&mut result, &json!({"choices": [{"delta": {"text": "Hel"}}]}));
        fold_chunk(&mut result, &json!({"choices": [{"delta": {"text": "lo"}}]}));

        assert_eq!(result.assistant_text, "Hello");
    }

    #[test]
    fn tool_call_argument_fragments_assemble_by_index() {
        let mut result = AssembledResult::default();

        fold_chunk(
            &mut result,
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "function": {"name": "get_weather", "arguments": ""}}
            ]}}]}),
        );
        fold_chunk(
            &mut result,
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"city\":"}}
            ]}}]}),
        );
        fold_chunk(
            &mut result,
            &json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"berlin\"}"}}
            ]}}]}),
        );

        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].id, "call_1");
        assert_eq!(result.tool_calls[0].function.name, "get_weather");
        assert_eq!(result.tool_calls[0].function.arguments, "{\"city\":\"berlin\"}");
    }

    #[test]
    fn buffered_tool_calls_without_index_assemble_in_array_order() {
        let mut result = AssembledResult::default();

        fold_chunk(
            &mut result,
            &json!({"choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "function": {"name": "get_weather", "arguments": "{\"city\":\"berlin\"}"}},
                        {"id": "call_2", "function": {"name": "get_time", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]}),
        );

        assert_eq!(result.tool_calls.len(), 2);
        assert_eq!(result.tool_calls[0].id, "call_1");
        assert_eq!(result.tool_calls[0].function.name, "get_weather");
        assert_eq!(result.tool_calls[1].id, "call_2");
        assert_eq!(result.tool_calls[1].function.name, "get_time");
    }

    #[test]
    fn finish_reason_and_model_are_remembered_from_any_chunk() {
        let mut result = AssembledResult::default();
        fold_chunk(&mut result, &json!({"model": "custom-llm", "choices": [{"delta": {}}]}));
        fold_chunk(&mut result, &json!({"choices": [{"delta": {}, "finish_reason": "length"}]}));

        assert_eq!(result.model, "custom-llm");
        assert_eq!(result.finish_reason.as_deref(), Some("length"));
    }
}
