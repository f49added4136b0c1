//! Streaming tool-call sieve.
//!
//! The sieve watches model text arrive chunk by chunk and decides, without
//! buffering the whole response, which bytes are prose to forward right away
//! and which bytes are (or may become) a `{"tool_calls": [...]}` payload.
//!
//! It never fails. Anything it cannot turn into a tool call is eventually
//! released as content: an object that never closes (safety valve), an object
//! that closes but decodes to nothing, or a payload sitting inside a fenced
//! code block.

use std::mem;

use tracing::debug;

use crate::incremental::CallStream;
use crate::parse::parse_standalone_tool_calls;
use crate::scan::{
    enclosing_brace, extract_balanced_object, find_enclosed_key, find_tool_calls_key, inside_code_fence,
    FENCE_MARKER, TOOL_CALLS_KEY,
};
use crate::tail::{TextTail, DEFAULT_TAIL_LIMIT};
use crate::types::{ParsedToolCall, ToolStreamEvent};

/// Largest capture, in bytes, the sieve holds before giving up on it.
pub const DEFAULT_CAPTURE_LIMIT: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SieveOptions {
    /// Safety valve: a capture longer than this is released as content.
    pub capture_limit: usize,
    /// Size of the recent-text window used for fence detection.
    pub tail_limit: usize,
}

impl Default for SieveOptions {
    fn default() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            tail_limit: DEFAULT_TAIL_LIMIT,
        }
    }
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Capturing(Capture),
}

/// Text believed to be inside a candidate tool-call object, from its opening
/// brace onward, plus the incremental tracking for this capture session.
#[derive(Debug, Default)]
struct Capture {
    buf: String,
    calls: CallStream,
}

enum Resolution {
    /// The object has not closed yet.
    Pending,
    /// The capture is decided. `calls` is empty when it turned out to be prose.
    Resolved {
        prefix: String,
        calls: Vec<ParsedToolCall>,
        suffix: String,
    },
}

/// Per-stream sieve state. Create one per streamed response, feed it with
/// [`process_chunk`](Self::process_chunk) and close it with [`flush`](Self::flush).
#[derive(Debug)]
pub struct ToolSieve {
    tool_names: Vec<String>,
    options: SieveOptions,
    /// Unclassified text not yet released.
    pending: String,
    phase: Phase,
    /// Recently released content, for fence detection.
    tail: TextTail,
}

impl ToolSieve {
    pub fn new(tool_names: Vec<String>) -> Self {
        Self::with_options(tool_names, SieveOptions::default())
    }

    pub fn with_options(tool_names: Vec<String>, options: SieveOptions) -> Self {
        Self {
            tool_names,
            options,
            pending: String::new(),
            phase: Phase::Idle,
            tail: TextTail::new(options.tail_limit),
        }
    }

    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.phase, Phase::Capturing(_))
    }

    /// Feed one upstream text fragment and collect the events it unlocks.
    pub fn process_chunk(&mut self, chunk: &str) -> Vec<ToolStreamEvent> {
        self.pending.push_str(chunk);
        let mut events = Vec::with_capacity(2);

        loop {
            if let Phase::Capturing(capture) = &mut self.phase {
                if !self.pending.is_empty() {
                    capture.buf.push_str(&self.pending);
                    self.pending.clear();
                }

                let deltas = capture.calls.next_deltas(&capture.buf, &self.tail);
                if !deltas.is_empty() {
                    events.push(ToolStreamEvent::ToolCallDeltas(deltas));
                }

                match resolve_capture(&capture.buf, &self.tail, &self.tool_names) {
                    Resolution::Pending => {
                        if capture.buf.len() <= self.options.capture_limit {
                            break;
                        }
                        let Phase::Capturing(capture) = mem::take(&mut self.phase) else {
                            break;
                        };
                        debug!(
                            "Capture exceeded {} bytes without closing; releasing as content",
                            self.options.capture_limit
                        );
                        self.emit_content(&mut events, capture.buf);
                    }
                    Resolution::Resolved {
                        prefix,
                        calls,
                        suffix,
                    } => {
                        self.phase = Phase::Idle;
                        self.emit_content(&mut events, prefix);
                        if !calls.is_empty() {
                            debug!("Sieve resolved {} tool call(s)", calls.len());
                            events.push(ToolStreamEvent::ToolCalls(calls));
                        }
                        self.pending.push_str(&suffix);
                    }
                }
                continue;
            }

            if self.pending.is_empty() {
                break;
            }

            if let Some(start) = find_tool_segment_start(&self.pending) {
                let captured = self.pending.split_off(start);
                let prefix = mem::take(&mut self.pending);
                self.emit_content(&mut events, prefix);
                debug!("Detected tool_calls key; capturing candidate object");
                self.phase = Phase::Capturing(Capture {
                    buf: captured,
                    calls: CallStream::default(),
                });
                continue;
            }

            // Hold back anything from the last suspicious marker on: it may be
            // the start of an object whose key has not arrived yet.
            let hold_from = find_suspicious_prefix_start(&self.pending).unwrap_or(self.pending.len());
            if hold_from == 0 {
                break;
            }
            let hold = self.pending.split_off(hold_from);
            let safe = mem::replace(&mut self.pending, hold);
            self.emit_content(&mut events, safe);
        }

        events
    }

    /// Close the stream: drain everything still buffered as trailing events.
    ///
    /// Consumes the sieve, so it runs exactly once per stream.
    pub fn flush(mut self) -> Vec<ToolStreamEvent> {
        let mut events = self.process_chunk("");

        if let Phase::Capturing(capture) = mem::take(&mut self.phase) {
            match resolve_capture(&capture.buf, &self.tail, &self.tool_names) {
                Resolution::Resolved {
                    prefix,
                    calls,
                    suffix,
                } => {
                    self.emit_content(&mut events, prefix);
                    if !calls.is_empty() {
                        events.push(ToolStreamEvent::ToolCalls(calls));
                    }
                    self.pending.push_str(&suffix);
                }
                Resolution::Pending => {
                    debug!(
                        "Stream ended inside an unterminated capture ({} bytes); releasing as content",
                        capture.buf.len()
                    );
                    self.emit_content(&mut events, capture.buf);
                }
            }
        }

        if !self.pending.is_empty() {
            let rest = mem::take(&mut self.pending);
            self.emit_content(&mut events, rest);
        }
        events
    }

    fn emit_content(&mut self, events: &mut Vec<ToolStreamEvent>, text: String) {
        if text.is_empty() {
            return;
        }
        self.tail.note(&text);
        events.push(ToolStreamEvent::Content(text));
    }
}

/// Try to settle the current capture.
fn resolve_capture(captured: &str, tail: &TextTail, tool_names: &[String]) -> Resolution {
    let Some((_, start)) = find_enclosed_key(captured) else {
        return Resolution::Pending;
    };
    let Some((object, end)) = extract_balanced_object(captured, start) else {
        return Resolution::Pending;
    };

    let prefix = &captured[..start];
    if tail.fenced_with(prefix) {
        debug!("Tool call payload sits inside a code fence; releasing as content");
        return Resolution::Resolved {
            prefix: captured.to_string(),
            calls: Vec::new(),
            suffix: String::new(),
        };
    }

    let calls = parse_standalone_tool_calls(object, tool_names);
    if calls.is_empty() {
        debug!("Balanced tool_calls object decoded to no calls; releasing as content");
        return Resolution::Resolved {
            prefix: captured[..end].to_string(),
            calls,
            suffix: captured[end..].to_string(),
        };
    }

    Resolution::Resolved {
        prefix: prefix.to_string(),
        calls,
        suffix: captured[end..].to_string(),
    }
}

/// Offset where a capture should begin: the brace enclosing the first
/// `tool_calls` key that is not inside a fence, or the key itself when no
/// brace precedes it.
fn find_tool_segment_start(text: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(key) = find_tool_calls_key(text, offset) {
        let start = enclosing_brace(text, key).unwrap_or(key);
        if !inside_code_fence(&text[..start]) {
            return Some(start);
        }
        offset = key + TOOL_CALLS_KEY.len();
    }
    None
}

/// Rightmost `{`, `[` or fence marker; text from here on is not yet safe.
fn find_suspicious_prefix_start(text: &str) -> Option<usize> {
    [text.rfind('{'), text.rfind('['), text.rfind(FENCE_MARKER)]
        .into_iter()
        .flatten()
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["search".to_string()]
    }

    fn content(events: &[ToolStreamEvent]) -> String {
        events.iter().filter_map(ToolStreamEvent::as_content).collect()
    }

    #[test]
    fn test_plain_text_streams_immediately() {
        let mut sieve = ToolSieve::new(names());
        let events = sieve.process_chunk("hello world");
        assert_eq!(events, vec![ToolStreamEvent::Content("hello world".into())]);
    }

    #[test]
    fn test_suspicious_suffix_is_held() {
        let mut sieve = ToolSieve::new(names());
        let events = sieve.process_chunk("see this {\"too");
        assert_eq!(content(&events), "see this ");
        let events = sieve.flush();
        assert_eq!(content(&events), "{\"too");
    }

    #[test]
    fn test_tool_call_with_prefix_and_suffix() {
        let mut sieve = ToolSieve::new(names());
        let mut events = sieve.process_chunk("Let me look. {\"tool_calls\":[{\"name\":\"search\",");
        events.extend(sieve.process_chunk("\"input\":{\"q\":\"go\"}}]} done"));
        events.extend(sieve.flush());

        assert_eq!(events[0], ToolStreamEvent::Content("Let me look. ".into()));
        let calls: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ToolStreamEvent::ToolCalls(calls) => Some(calls),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].name, "search");
        assert_eq!(content(&events), "Let me look.  done");
    }

    #[test]
    fn test_invalid_tool_json_released_as_content() {
        let mut sieve = ToolSieve::new(names());
        let text = r#"{"tool_calls":[{"input":{"q":"go"}}]}"#;
        let mut events = sieve.process_chunk(text);
        events.extend(sieve.flush());
        assert!(events.iter().all(|e| !e.is_tool_calls()));
        assert_eq!(content(&events), text);
    }

    #[test]
    fn test_unterminated_capture_released_on_flush() {
        let mut sieve = ToolSieve::new(names());
        let text = r#"{"tool_calls":[{"name":"search","input":{"q":"#;
        assert!(sieve.process_chunk(text).is_empty());
        assert!(sieve.is_capturing());
        assert_eq!(content(&sieve.flush()), text);
    }

    #[test]
    fn test_safety_valve_releases_oversized_capture() {
        let options = SieveOptions {
            capture_limit: 64,
            ..SieveOptions::default()
        };
        let mut sieve = ToolSieve::with_options(names(), options);
        let head = r#"{"tool_calls":[{"name":"x","input":{"#;
        assert!(sieve.process_chunk(head).is_empty());
        let events = sieve.process_chunk(&"a".repeat(100));
        assert!(!sieve.is_capturing());
        assert_eq!(content(&events), format!("{head}{}", "a".repeat(100)));
    }

    #[test]
    fn test_fenced_example_is_not_intercepted() {
        let mut sieve = ToolSieve::new(names());
        let text = "```json\n{\"tool_calls\":[{\"name\":\"search\",\"input\":{\"q\":\"go\"}}]}\n```";
        let mut events = Vec::new();
        for ch in text.chars() {
            events.extend(sieve.process_chunk(&ch.to_string()));
        }
        events.extend(sieve.flush());
        assert!(events.iter().all(|e| !e.is_tool_calls()));
        assert_eq!(content(&events), text);
    }

    #[test]
    fn test_text_after_tool_call_is_reprocessed() {
        let mut sieve = ToolSieve::new(names());
        let text = r#"{"tool_calls":[{"name":"search","input":{}}]}{"tool_calls":[{"name":"search","input":{"q":2}}]}"#;
        let mut events = sieve.process_chunk(text);
        events.extend(sieve.flush());
        let batches = events.iter().filter(|e| e.is_tool_calls()).count();
        assert_eq!(batches, 2);
        assert!(content(&events).is_empty());
    }

    #[test]
    fn test_prose_mention_before_real_call() {
        let mut sieve = ToolSieve::new(names());
        let text = r#"I will emit tool_calls now. {"tool_calls":[{"name":"search","input":{"q":"go"}}]}"#;
        let mut events = Vec::new();
        for piece in [&text[..30], &text[30..50], &text[50..]] {
            events.extend(sieve.process_chunk(piece));
        }
        events.extend(sieve.flush());

        let calls: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ToolStreamEvent::ToolCalls(calls) => Some(calls),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 1, "the real call should still be detected");
        assert_eq!(calls[0][0].name, "search");
        assert_eq!(content(&events), "I will emit tool_calls now. ");
        assert_eq!(calls[0].as_slice(), crate::parse::parse_tool_calls(text, &names()).as_slice());
    }

    #[test]
    fn test_find_suspicious_prefix_start() {
        assert_eq!(find_suspicious_prefix_start("plain"), None);
        assert_eq!(find_suspicious_prefix_start("a { b [ c"), Some(6));
        assert_eq!(find_suspicious_prefix_start("a [ ``` x"), Some(4));
    }

    #[test]
    fn test_find_tool_segment_start_skips_fenced_keys() {
        let text = "```json\n{\"tool_calls\":[]}";
        assert_eq!(find_tool_segment_start(text), None);
        let text = "say {\"tool_calls\":[";
        assert_eq!(find_tool_segment_start(text), Some(4));
        let text = "bare tool_calls mention";
        assert_eq!(find_tool_segment_start(text), Some(5));
    }
}
