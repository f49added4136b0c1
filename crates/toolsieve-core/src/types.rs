use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool call recovered from model text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToolCall {
    pub name: String,
    /// Decoded arguments. Never null; empty when the call carried none.
    pub input: Map<String, Value>,
}

impl ParsedToolCall {
    pub fn new(name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }

    /// Compact JSON encoding of `input`, as sent on the wire.
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.input).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One incremental slice of a single tool call's name or arguments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn name(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: Some(name.into()),
            arguments: None,
        }
    }

    pub fn arguments(index: usize, fragment: impl Into<String>) -> Self {
        Self {
            index,
            name: None,
            arguments: Some(fragment.into()),
        }
    }
}

/// Event emitted by the sieve, in the order its source text was decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ToolStreamEvent {
    /// Plain text, safe to forward immediately.
    Content(String),
    /// Final, complete tool calls.
    ToolCalls(Vec<ParsedToolCall>),
    /// Early preview of a single call; the final `ToolCalls` event is authoritative.
    ToolCallDeltas(Vec<ToolCallDelta>),
}

impl ToolStreamEvent {
    pub fn as_content(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_tool_calls(&self) -> bool {
        matches!(self, Self::ToolCalls(_))
    }
}
