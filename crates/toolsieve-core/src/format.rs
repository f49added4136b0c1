//! OpenAI-shaped rendering of sieve output.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::types::{ParsedToolCall, ToolCallDelta};

/// A fresh `call_<32 hex>` id.
pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Stable call ids per tool-call index for the lifetime of one stream, so an
/// early delta and the final call at the same index share an id.
#[derive(Debug, Clone, Default)]
pub struct CallIdStore {
    ids: HashMap<usize, String>,
}

impl CallIdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_for(&mut self, index: usize) -> &str {
        self.ids.entry(index).or_insert_with(new_call_id)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.ids.get(&index).map(String::as_str)
    }
}

/// Non-streaming `message.tool_calls`, each with a fresh id.
pub fn format_openai_tool_calls(calls: &[ParsedToolCall]) -> Vec<Value> {
    calls
        .iter()
        .map(|call| {
            json!({
                "id": new_call_id(),
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments_json(),
                },
            })
        })
        .collect()
}

/// `delta.tool_calls` entries for early deltas. Deltas carrying neither a
/// name nor an argument fragment are skipped.
pub fn format_stream_tool_call_deltas(deltas: &[ToolCallDelta], ids: &mut CallIdStore) -> Vec<Value> {
    deltas
        .iter()
        .filter_map(|delta| {
            let name = delta.name.as_deref().filter(|name| !name.is_empty());
            let arguments = delta.arguments.as_deref().filter(|args| !args.is_empty());
            if name.is_none() && arguments.is_none() {
                return None;
            }

            let mut function = Map::new();
            if let Some(name) = name {
                function.insert("name".to_string(), Value::from(name));
            }
            if let Some(arguments) = arguments {
                function.insert("arguments".to_string(), Value::from(arguments));
            }
            Some(json!({
                "index": delta.index,
                "id": ids.id_for(delta.index),
                "type": "function",
                "function": function,
            }))
        })
        .collect()
}

/// `delta.tool_calls` entries for the final, complete calls, reusing any id
/// already handed out for the same index.
pub fn format_final_stream_tool_calls(calls: &[ParsedToolCall], ids: &mut CallIdStore) -> Vec<Value> {
    calls
        .iter()
        .enumerate()
        .map(|(index, call)| {
            json!({
                "index": index,
                "id": ids.id_for(index),
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments_json(),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ParsedToolCall {
        let input = json!({"q": "go", "limit": 3});
        let Value::Object(input) = input else {
            unreachable!()
        };
        ParsedToolCall::new("search", input)
    }

    #[test]
    fn test_call_id_shape() {
        let id = new_call_id();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), 5 + 32);
        assert!(!id.contains('-'));
    }

    #[test]
    fn test_openai_tool_calls_shape() {
        let out = format_openai_tool_calls(&[call()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["type"], "function");
        assert_eq!(out[0]["function"]["name"], "search");
        assert_eq!(out[0]["function"]["arguments"], r#"{"q":"go","limit":3}"#);
        assert!(out[0].get("index").is_none());
    }

    #[test]
    fn test_delta_and_final_share_ids() {
        let mut ids = CallIdStore::new();
        let deltas = vec![
            ToolCallDelta::name(0, "search"),
            ToolCallDelta::arguments(0, r#"{"q":"go","limit":3}"#),
            ToolCallDelta::default(),
        ];
        let early = format_stream_tool_call_deltas(&deltas, &mut ids);
        assert_eq!(early.len(), 2, "empty delta should be skipped");
        assert_eq!(early[0]["function"]["name"], "search");
        assert!(early[0]["function"].get("arguments").is_none());
        assert!(early[1]["function"].get("name").is_none());

        let last = format_final_stream_tool_calls(&[call()], &mut ids);
        assert_eq!(last[0]["id"], early[0]["id"]);
        assert_eq!(last[0]["index"], 0);
        assert_eq!(ids.get(0), last[0]["id"].as_str());
    }
}
