//! Tool-call detection for streamed LLM output.
//!
//! Models without native function calling are prompted to answer with a
//! `{"tool_calls": [...]}` JSON object. This crate finds those objects in
//! model text, both in complete responses ([`parse_tool_calls`]) and in
//! streams ([`ToolSieve`], [`ToolCallStream`]), while letting ordinary prose
//! and fenced code examples through untouched.

pub mod format;
pub mod incremental;
pub mod parse;
pub mod prompt;
pub mod scan;
pub mod sieve;
pub mod stream;
pub mod tail;
pub mod types;

pub use format::{
    format_final_stream_tool_calls, format_openai_tool_calls, format_stream_tool_call_deltas, new_call_id,
    CallIdStore,
};
pub use parse::{extract_tool_names, filter_tool_calls, parse_standalone_tool_calls, parse_tool_calls};
pub use prompt::{build_tool_prompt, inject_tool_prompt};
pub use sieve::{SieveOptions, ToolSieve, DEFAULT_CAPTURE_LIMIT};
pub use stream::{Channel, ChannelEvent, FinishReason, FinishedStream, StreamPart, ToolCallPolicy, ToolCallStream};
pub use tail::DEFAULT_TAIL_LIMIT;
pub use types::{ParsedToolCall, ToolCallDelta, ToolStreamEvent};
