//! Tool-call payload parsing for complete text.
//!
//! The batch entry point [`parse_tool_calls`] is used for non-streaming
//! responses; [`parse_standalone_tool_calls`] is the stricter variant the
//! streaming sieve runs on an object it has already isolated. Both share the
//! same payload decoding so streamed and non-streamed responses detect tool
//! calls identically.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::scan::{extract_balanced_object, find_tool_calls_key, skip_spaces, FENCE_MARKER, TOOL_CALLS_KEY};
use crate::types::ParsedToolCall;

/// Keys that may carry a call's arguments, in priority order.
pub const ARGUMENT_KEYS: [&str; 5] = ["input", "arguments", "args", "parameters", "params"];

/// Key under which undecodable string arguments are preserved.
pub const RAW_ARGUMENTS_KEY: &str = "_raw";

/// Name used for declared tools that carry no name of their own.
pub const UNKNOWN_TOOL_NAME: &str = "unknown";

/// Extract tool calls from a complete response body.
///
/// Fenced code blocks are removed first; whatever they contain is treated as
/// documentation, never as a live call.
pub fn parse_tool_calls(text: &str, tool_names: &[String]) -> Vec<ParsedToolCall> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let stripped = strip_fenced_code_blocks(text);
    if stripped.trim().is_empty() {
        return Vec::new();
    }

    let parsed = build_candidates(&stripped)
        .iter()
        .map(|candidate| parse_payload(candidate))
        .find(|calls| !calls.is_empty());

    match parsed {
        Some(calls) => {
            debug!("Parsed {} tool call(s) from response text", calls.len());
            filter_tool_calls(calls, tool_names)
        }
        None => Vec::new(),
    }
}

/// Extract tool calls only when the whole trimmed text is a JSON object or
/// array with no surrounding prose and no fence marker.
pub fn parse_standalone_tool_calls(text: &str, tool_names: &[String]) -> Vec<ParsedToolCall> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains(FENCE_MARKER) {
        return Vec::new();
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Vec::new();
    }
    let parsed = parse_payload(trimmed);
    if parsed.is_empty() {
        return parsed;
    }
    filter_tool_calls(parsed, tool_names)
}

/// Derive the tool-name allow-list from a request's declared tools.
///
/// Accepts both `{"type":"function","function":{"name":..}}` and bare
/// `{"name":..}` shapes. Object tools without a name still count, as
/// [`UNKNOWN_TOOL_NAME`], so the request stays in tool mode.
pub fn extract_tool_names(tools: &[Value]) -> Vec<String> {
    tools
        .iter()
        .filter_map(Value::as_object)
        .map(|tool| {
            let def = tool
                .get("function")
                .and_then(Value::as_object)
                .filter(|function| !function.is_empty())
                .unwrap_or(tool);
            def.get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(UNKNOWN_TOOL_NAME)
                .to_string()
        })
        .collect()
}

/// Drop calls whose name is not allowed, unless that would drop every call:
/// once the model has clearly emitted call syntax, surfacing an unexpected
/// tool beats leaking raw JSON to the user.
pub fn filter_tool_calls(parsed: Vec<ParsedToolCall>, tool_names: &[String]) -> Vec<ParsedToolCall> {
    if tool_names.is_empty() {
        return parsed;
    }
    let allowed: HashSet<&str> = tool_names.iter().map(String::as_str).collect();
    let kept: Vec<ParsedToolCall> = parsed
        .iter()
        .filter(|call| allowed.contains(call.name.as_str()))
        .cloned()
        .collect();

    if kept.is_empty() && !parsed.is_empty() {
        debug!(
            "No parsed tool call matched the declared tools; keeping {} call(s) as fallback",
            parsed.len()
        );
        return parsed;
    }
    kept
}

/// Decode one JSON candidate into tool calls.
///
/// Accepts `{"tool_calls":[...]}`, a bare array of call objects, or a single
/// call object.
pub fn parse_payload(payload: &str) -> Vec<ParsedToolCall> {
    let Ok(decoded) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };
    match decoded {
        Value::Object(map) => match map.get(TOOL_CALLS_KEY) {
            Some(list) => parse_call_list(list),
            None => parse_call_item(&map).into_iter().collect(),
        },
        Value::Array(_) => parse_call_list(&decoded),
        _ => Vec::new(),
    }
}

fn parse_call_list(value: &Value) -> Vec<ParsedToolCall> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(parse_call_item)
        .collect()
}

fn parse_call_item(item: &Map<String, Value>) -> Option<ParsedToolCall> {
    let mut name = item.get("name").and_then(Value::as_str).unwrap_or_default();
    let mut input = item.get("input");

    if let Some(function) = item.get("function").and_then(Value::as_object) {
        if name.is_empty() {
            name = function.get("name").and_then(Value::as_str).unwrap_or_default();
        }
        if input.is_none() {
            input = function.get("arguments");
        }
    }
    if input.is_none() {
        input = ARGUMENT_KEYS[1..].iter().find_map(|key| item.get(*key));
    }

    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(ParsedToolCall::new(name, parse_call_input(input)))
}

fn parse_call_input(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Map::new();
            }
            match serde_json::from_str::<Map<String, Value>>(raw) {
                Ok(map) => map,
                Err(_) => {
                    let mut map = Map::new();
                    map.insert(RAW_ARGUMENTS_KEY.to_string(), Value::String(raw.to_string()));
                    map
                }
            }
        }
        _ => Map::new(),
    }
}

/// Ordered, de-duplicated JSON candidates for a (fence-stripped) text body.
pub fn build_candidates(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let mut candidates = vec![trimmed.to_string()];

    candidates.extend(fenced_json_blocks(trimmed));
    candidates.extend(extract_tool_call_objects(trimmed));

    if let (Some(first), Some(last)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if last > first {
            candidates.push(trimmed[first..=last].trim().to_string());
        }
    }

    if let Some(legacy) = legacy_tool_calls_candidate(trimmed) {
        candidates.push(legacy);
    }

    let mut seen = HashSet::new();
    candidates.retain(|candidate| !candidate.is_empty() && seen.insert(candidate.clone()));
    candidates
}

/// Replace every complete fenced block with a single space. An unclosed
/// trailing fence is left as-is.
pub fn strip_fenced_code_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(FENCE_MARKER) {
        let after_open = open + FENCE_MARKER.len();
        let Some(close_rel) = rest[after_open..].find(FENCE_MARKER) else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push(' ');
        rest = &rest[after_open + close_rel + FENCE_MARKER.len()..];
    }
    out.push_str(rest);
    out
}

/// Trimmed contents of every complete fenced block, minus an optional `json`
/// language tag.
fn fenced_json_blocks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE_MARKER) {
        let body_start = open + FENCE_MARKER.len();
        let Some(close_rel) = rest[body_start..].find(FENCE_MARKER) else {
            break;
        };
        let body = &rest[body_start..body_start + close_rel];
        let body = body.strip_prefix("json").unwrap_or(body);
        out.push(body.trim().to_string());
        rest = &rest[body_start + close_rel + FENCE_MARKER.len()..];
    }
    out
}

/// Every balanced object enclosing an occurrence of `tool_calls`, found by
/// walking backward from the key to the nearest brace that balances past it.
pub fn extract_tool_call_objects(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut offset = 0;

    while let Some(key) = find_tool_calls_key(text, offset) {
        let key_end = key + TOOL_CALLS_KEY.len();
        let mut search_end = key;
        let mut found = None;

        while let Some(start) = text[..search_end].rfind('{') {
            if let Some((object, end)) = extract_balanced_object(text, start) {
                if end > key_end {
                    found = Some((object, end));
                    break;
                }
            }
            search_end = start;
        }

        match found {
            Some((object, end)) => {
                out.push(object.trim().to_string());
                offset = end;
            }
            None => offset = key_end,
        }
    }

    out
}

/// Last-resort match for `{"tool_calls":[ ... ]}` (single or double quoted key),
/// taking the shortest array body that is followed by a closing brace.
fn legacy_tool_calls_candidate(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    for (open, _) in text.match_indices('{') {
        let mut i = skip_spaces(text, open + 1);
        let Some(&quote) = bytes.get(i).filter(|b| matches!(b, b'"' | b'\'')) else {
            continue;
        };
        i += 1;
        if !text[i..].starts_with(TOOL_CALLS_KEY) {
            continue;
        }
        i += TOOL_CALLS_KEY.len();
        if bytes.get(i) != Some(&quote) {
            continue;
        }
        i = skip_spaces(text, i + 1);
        if bytes.get(i) != Some(&b':') {
            continue;
        }
        i = skip_spaces(text, i + 1);
        if bytes.get(i) != Some(&b'[') {
            continue;
        }
        let body_start = i + 1;

        for (close_rel, _) in text[body_start..].match_indices(']') {
            let close = body_start + close_rel;
            let brace = skip_spaces(text, close + 1);
            if bytes.get(brace) == Some(&b'}') {
                return Some(format!(
                    "{{\"{}\":[{}]}}",
                    TOOL_CALLS_KEY,
                    &text[body_start..close]
                ));
            }
        }
    }
    None
}
