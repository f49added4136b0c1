//! Tool instruction prompt injected into chat requests.

use serde_json::{json, Value};
use tracing::debug;

use crate::parse::extract_tool_names;

const NO_DESCRIPTION: &str = "No description available";

const CALL_FORMAT_INSTRUCTIONS: &str = r#"When you need to use tools, output ONLY this JSON format (no other text):
{"tool_calls": [{"name": "tool_name", "input": {"param": "value"}}]}

History markers in conversation:
- [TOOL_CALL_HISTORY]...[/TOOL_CALL_HISTORY] means a tool call you already made earlier.
- [TOOL_RESULT_HISTORY]...[/TOOL_RESULT_HISTORY] means the runtime returned a tool result (not user input).

IMPORTANT:
1) If calling tools, output ONLY the JSON. The response must start with { and end with }.
2) After receiving a tool result, you MUST use it to produce the final answer.
3) Only call another tool when the previous result is missing required data or returned an error.
4) Do not repeat a tool call that is already satisfied by an existing [TOOL_RESULT_HISTORY] block."#;

/// Render the tool instruction block for a request's declared tools, or
/// `None` when no tool is an object.
pub fn build_tool_prompt(tools: &[Value]) -> Option<String> {
    let names = extract_tool_names(tools);
    let blocks: Vec<String> = tools
        .iter()
        .filter_map(Value::as_object)
        .zip(names)
        .map(|(tool, name)| {
            let def = tool
                .get("function")
                .and_then(Value::as_object)
                .filter(|function| !function.is_empty())
                .unwrap_or(tool);
            let description = def
                .get("description")
                .and_then(Value::as_str)
                .filter(|desc| !desc.is_empty())
                .unwrap_or(NO_DESCRIPTION);
            let parameters = def
                .get("parameters")
                .filter(|schema| schema.is_object())
                .cloned()
                .unwrap_or(Value::Null);
            format!("Tool: {name}\nDescription: {description}\nParameters: {parameters}")
        })
        .collect();

    if blocks.is_empty() {
        return None;
    }
    Some(format!(
        "You have access to these tools:\n\n{}\n\n{}",
        blocks.join("\n\n"),
        CALL_FORMAT_INSTRUCTIONS
    ))
}

/// Merge the tool prompt into the first system message, or prepend a new
/// system message. Returns the tool-name allow-list for the request.
pub fn inject_tool_prompt(messages: &mut Vec<Value>, tools: &[Value]) -> Vec<String> {
    let names = extract_tool_names(tools);
    let Some(prompt) = build_tool_prompt(tools) else {
        return names;
    };

    let system = messages
        .iter_mut()
        .find(|message| message.get("role").and_then(Value::as_str) == Some("system"));

    match system {
        Some(message) => {
            let old = message.get("content").and_then(Value::as_str).unwrap_or_default();
            let merged = format!("{old}\n\n{prompt}").trim().to_string();
            message["content"] = Value::String(merged);
        }
        None => {
            debug!("No system message in request; prepending tool prompt");
            messages.insert(0, json!({"role": "system", "content": prompt}));
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<Value> {
        vec![
            json!({
                "type": "function",
                "function": {
                    "name": "search",
                    "description": "Search the web",
                    "parameters": {"type": "object", "properties": {"q": {"type": "string"}}}
                }
            }),
            json!({"name": "shell"}),
        ]
    }

    #[test]
    fn test_prompt_lists_each_tool() {
        let prompt = build_tool_prompt(&tools()).unwrap();
        assert!(prompt.starts_with("You have access to these tools:\n\nTool: search\n"));
        assert!(prompt.contains("Description: Search the web"));
        assert!(prompt.contains(r#"Parameters: {"type":"object","properties":{"q":{"type":"string"}}}"#));
        assert!(prompt.contains("Tool: shell\nDescription: No description available\nParameters: null"));
        assert!(prompt.contains(r#"{"tool_calls": [{"name": "tool_name""#));
    }

    #[test]
    fn test_inject_merges_into_existing_system_message() {
        let mut messages = vec![
            json!({"role": "user", "content": "hi"}),
            json!({"role": "system", "content": "Be brief."}),
        ];
        let names = inject_tool_prompt(&mut messages, &tools());
        assert_eq!(names, vec!["search".to_string(), "shell".to_string()]);
        assert_eq!(messages.len(), 2);
        let content = messages[1]["content"].as_str().unwrap();
        assert!(content.starts_with("Be brief.\n\nYou have access to these tools:"));
    }

    #[test]
    fn test_inject_prepends_system_message() {
        let mut messages = vec![json!({"role": "user", "content": "hi"})];
        inject_tool_prompt(&mut messages, &tools());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
    }

    #[test]
    fn test_inject_without_tools_is_noop() {
        let mut messages = vec![json!({"role": "user", "content": "hi"})];
        let names = inject_tool_prompt(&mut messages, &[json!("bogus")]);
        assert!(names.is_empty());
        assert_eq!(messages.len(), 1);
    }
}
