//! Incremental single-call classification and argument delta building.
//!
//! Once a capture clearly holds `"tool_calls": [ { ...`, the sieve asks this
//! module whether exactly one call is present. Only then are the call's name
//! and arguments streamed early; anything ambiguous waits for the final,
//! complete `ToolCalls` event.

use tracing::debug;

use crate::parse::parse_payload;
use crate::scan::{extract_balanced_object, find_enclosed_key, skip_spaces, TOOL_CALLS_KEY};
use crate::tail::TextTail;
use crate::types::ToolCallDelta;

/// What the capture tells us so far about the `tool_calls` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The array has not opened, or has not closed with one object yet.
    Undetermined,
    /// The array closed holding exactly one object.
    Single,
    /// A second object or a top-level separator was seen.
    Multiple,
}

/// Incremental tracking for one capture session.
///
/// A fresh capture always starts `Undetermined`; `Multiple` is sticky until
/// the capture ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallStream {
    #[default]
    Undetermined,
    Single(SingleCall),
    Multiple,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SingleCall {
    name_sent: bool,
    arguments_sent: bool,
}

impl CallStream {
    pub fn deltas_disabled(&self) -> bool {
        matches!(self, Self::Multiple)
    }

    pub fn arguments_complete(&self) -> bool {
        matches!(self, Self::Single(SingleCall { arguments_sent: true, .. }))
    }

    /// Build whatever new deltas the capture now supports.
    pub fn next_deltas(&mut self, capture: &str, tail: &TextTail) -> Vec<ToolCallDelta> {
        if self.deltas_disabled() || capture.is_empty() {
            return Vec::new();
        }
        let Some((key, start)) = find_enclosed_key(capture) else {
            return Vec::new();
        };
        if tail.fenced_with(&capture[..start]) {
            return Vec::new();
        }

        match classify(capture, key) {
            Classification::Multiple => {
                debug!("Multiple tool calls in capture; disabling incremental deltas");
                *self = Self::Multiple;
                return Vec::new();
            }
            Classification::Undetermined => return Vec::new(),
            Classification::Single => {}
        }

        let Some(call_start) = first_call_object_start(capture, key) else {
            return Vec::new();
        };
        if matches!(self, Self::Undetermined) {
            *self = Self::Single(SingleCall::default());
        }
        let Self::Single(call) = self else {
            return Vec::new();
        };
        call.advance(capture, call_start)
    }
}

impl SingleCall {
    /// `Single` means the array has closed, so the call object is complete.
    /// It is decoded exactly as the final call will be, which keeps the
    /// argument fragments equal to the final compact arguments.
    fn advance(&mut self, capture: &str, call_start: usize) -> Vec<ToolCallDelta> {
        let mut deltas = Vec::with_capacity(2);
        if self.name_sent && self.arguments_sent {
            return deltas;
        }
        let Some((object, _)) = extract_balanced_object(capture, call_start) else {
            return deltas;
        };
        let Some(call) = parse_payload(object).into_iter().next() else {
            return deltas;
        };

        if !self.name_sent {
            self.name_sent = true;
            deltas.push(ToolCallDelta::name(0, call.name.as_str()));
        }
        if !self.arguments_sent {
            self.arguments_sent = true;
            deltas.push(ToolCallDelta::arguments(0, call.arguments_json()));
        }
        deltas
    }
}

/// Classify the `tool_calls` array that follows the key at `key_index`.
pub fn classify(text: &str, key_index: usize) -> Classification {
    let Some(array_start) = find_tool_calls_array_start(text, key_index) else {
        return Classification::Undetermined;
    };
    let bytes = text.as_bytes();
    let first = skip_spaces(text, array_start + 1);
    if bytes.get(first) != Some(&b'{') {
        return Classification::Undetermined;
    }

    let mut objects = 0usize;
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for &ch in &bytes[first..] {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            b'"' | b'\'' => quote = Some(ch),
            b'{' => {
                if depth == 0 {
                    objects += 1;
                    if objects > 1 {
                        return Classification::Multiple;
                    }
                }
                depth += 1;
            }
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => return Classification::Multiple,
            b']' if depth == 0 => {
                return if objects == 1 {
                    Classification::Single
                } else {
                    Classification::Undetermined
                };
            }
            _ => {}
        }
    }

    Classification::Undetermined
}

/// Start of the first call object inside the `tool_calls` array.
pub fn first_call_object_start(text: &str, key_index: usize) -> Option<usize> {
    let array_start = find_tool_calls_array_start(text, key_index)?;
    let i = skip_spaces(text, array_start + 1);
    (text.as_bytes().get(i) == Some(&b'{')).then_some(i)
}

fn find_tool_calls_array_start(text: &str, key_index: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let from = key_index + TOOL_CALLS_KEY.len();
    let colon = from + bytes.get(from..)?.iter().position(|&b| b == b':')?;
    let i = skip_spaces(text, colon + 1);
    (bytes.get(i) == Some(&b'[')).then_some(i)
}
