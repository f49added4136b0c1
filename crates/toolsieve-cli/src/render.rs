//! Output rendering for sieve events.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use toolsieve_core::{
    format_final_stream_tool_calls, format_openai_tool_calls, format_stream_tool_call_deltas, CallIdStore, Channel,
    ChannelEvent, FinishReason, ParsedToolCall, ToolStreamEvent,
};

use crate::cli_args::StreamFormat;

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

/// Turns sieve events into output lines in the chosen format.
pub struct EventRenderer {
    format: StreamFormat,
    completion_id: String,
    ids: CallIdStore,
    role_sent: bool,
}

impl EventRenderer {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            completion_id: completion_id(),
            ids: CallIdStore::new(),
            role_sent: false,
        }
    }

    /// Output line for one event, if the event renders to anything.
    pub fn render(&mut self, event: &ChannelEvent) -> serde_json::Result<Option<String>> {
        match self.format {
            StreamFormat::Jsonl => serde_json::to_string(event).map(Some),
            StreamFormat::Openai => match self.openai_delta(event) {
                Some(delta) => {
                    let chunk = self.chunk(Value::Object(delta), Value::Null);
                    Ok(Some(format!("data: {}\n", serde_json::to_string(&chunk)?)))
                }
                None => Ok(None),
            },
        }
    }

    /// Closing lines once the stream is done.
    pub fn finish(&mut self, reason: FinishReason) -> serde_json::Result<Vec<String>> {
        match self.format {
            StreamFormat::Jsonl => Ok(vec![serde_json::to_string(&json!({ "finish_reason": reason }))?]),
            StreamFormat::Openai => {
                let chunk = self.chunk(json!({}), Value::from(reason.as_str()));
                Ok(vec![
                    format!("data: {}\n", serde_json::to_string(&chunk)?),
                    "data: [DONE]\n".to_string(),
                ])
            }
        }
    }

    fn openai_delta(&mut self, event: &ChannelEvent) -> Option<Map<String, Value>> {
        let mut delta = Map::new();
        match (&event.event, event.channel) {
            (ToolStreamEvent::Content(text), Channel::Content) => {
                delta.insert("content".to_string(), Value::from(text.as_str()));
            }
            (ToolStreamEvent::Content(text), Channel::Thinking) => {
                delta.insert("reasoning_content".to_string(), Value::from(text.as_str()));
            }
            (ToolStreamEvent::ToolCallDeltas(deltas), _) => {
                let formatted = format_stream_tool_call_deltas(deltas, &mut self.ids);
                if formatted.is_empty() {
                    return None;
                }
                delta.insert("tool_calls".to_string(), Value::Array(formatted));
            }
            (ToolStreamEvent::ToolCalls(calls), _) => {
                let formatted = format_final_stream_tool_calls(calls, &mut self.ids);
                delta.insert("tool_calls".to_string(), Value::Array(formatted));
            }
        }
        if !self.role_sent {
            self.role_sent = true;
            delta.insert("role".to_string(), Value::from("assistant"));
        }
        Some(delta)
    }

    fn chunk(&self, delta: Value, finish_reason: Value) -> Value {
        json!({
            "id": self.completion_id,
            "object": "chat.completion.chunk",
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
    }
}

/// Non-streaming `chat.completion` body for a complete response.
pub fn openai_completion(text: &str, calls: &[ParsedToolCall]) -> Value {
    let (message, finish_reason) = if calls.is_empty() {
        (json!({"role": "assistant", "content": text}), FinishReason::Stop)
    } else {
        (
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": format_openai_tool_calls(calls),
            }),
            FinishReason::ToolCalls,
        )
    };
    json!({
        "id": completion_id(),
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason.as_str(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolsieve_core::ToolCallDelta;

    fn event(channel: Channel, event: ToolStreamEvent) -> ChannelEvent {
        ChannelEvent { channel, event }
    }

    fn parse_sse(line: &str) -> Value {
        let body = line.strip_prefix("data: ").unwrap().trim_end();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_jsonl_lines() {
        let mut renderer = EventRenderer::new(StreamFormat::Jsonl);
        let line = renderer
            .render(&event(Channel::Content, ToolStreamEvent::Content("hi".into())))
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"channel": "content", "type": "content", "data": "hi"}));

        let done = renderer.finish(FinishReason::ToolCalls).unwrap();
        assert_eq!(done, vec![r#"{"finish_reason":"tool_calls"}"#.to_string()]);
    }

    #[test]
    fn test_openai_chunks() {
        let mut renderer = EventRenderer::new(StreamFormat::Openai);

        let first = renderer
            .render(&event(Channel::Thinking, ToolStreamEvent::Content("hmm".into())))
            .unwrap()
            .unwrap();
        let first = parse_sse(&first);
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["reasoning_content"], "hmm");
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");

        let delta = renderer
            .render(&event(
                Channel::Content,
                ToolStreamEvent::ToolCallDeltas(vec![ToolCallDelta::name(0, "search")]),
            ))
            .unwrap()
            .unwrap();
        let delta = parse_sse(&delta);
        assert!(delta["choices"][0]["delta"].get("role").is_none());
        assert_eq!(delta["choices"][0]["delta"]["tool_calls"][0]["function"]["name"], "search");

        let lines = renderer.finish(FinishReason::Stop).unwrap();
        assert_eq!(parse_sse(&lines[0])["choices"][0]["finish_reason"], "stop");
        assert_eq!(lines[1], "data: [DONE]\n");
    }

    #[test]
    fn test_empty_deltas_render_nothing() {
        let mut renderer = EventRenderer::new(StreamFormat::Openai);
        let rendered = renderer
            .render(&event(
                Channel::Content,
                ToolStreamEvent::ToolCallDeltas(vec![ToolCallDelta::default()]),
            ))
            .unwrap();
        assert!(rendered.is_none());
    }

    #[test]
    fn test_openai_completion() {
        let body = openai_completion("plain answer", &[]);
        assert_eq!(body["choices"][0]["message"]["content"], "plain answer");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");

        let call = ParsedToolCall::new("search", Map::new());
        let body = openai_completion("{...}", &[call]);
        assert!(body["choices"][0]["message"]["content"].is_null());
        assert_eq!(body["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
    }
}
