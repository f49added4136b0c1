//! Dual-channel stream driver.
//!
//! Upstream parts arrive tagged as visible answer text or reasoning text. Each
//! channel gets its own [`ToolSieve`], since a reasoning model may write tool
//! JSON into either one, and the two must never share buffers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sieve::{SieveOptions, ToolSieve};
use crate::types::ToolStreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Content,
    Thinking,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Thinking => "thinking",
        }
    }
}

/// One decoded upstream fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPart {
    pub channel: Channel,
    pub text: String,
}

impl StreamPart {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            channel: Channel::Content,
            text: text.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            channel: Channel::Thinking,
            text: text.into(),
        }
    }
}

/// How tool calls are handled for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCallPolicy {
    /// Sieve text for tool calls at all. When off, text passes through untouched.
    pub enabled: bool,
    /// Forward early `ToolCallDeltas` events for a single, certain call.
    pub emit_deltas: bool,
}

impl Default for ToolCallPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            emit_deltas: true,
        }
    }
}

/// Why the completion stopped, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::ToolCalls => "tool_calls",
        }
    }
}

/// A sieve event tagged with the channel it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelEvent {
    pub channel: Channel,
    #[serde(flatten)]
    pub event: ToolStreamEvent,
}

/// Everything left once the stream is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedStream {
    pub events: Vec<ChannelEvent>,
    pub finish_reason: FinishReason,
}

#[derive(Debug)]
pub struct ToolCallStream {
    policy: ToolCallPolicy,
    /// `None` when the stream passes text through unsieved.
    sieves: Option<ChannelSieves>,
    saw_tool_calls: bool,
}

#[derive(Debug)]
struct ChannelSieves {
    content: ToolSieve,
    thinking: ToolSieve,
}

impl ToolCallStream {
    pub fn new(tool_names: Vec<String>, policy: ToolCallPolicy) -> Self {
        Self::with_options(tool_names, policy, SieveOptions::default())
    }

    pub fn with_options(tool_names: Vec<String>, policy: ToolCallPolicy, options: SieveOptions) -> Self {
        let sieves = if policy.enabled && !tool_names.is_empty() {
            Some(ChannelSieves {
                content: ToolSieve::with_options(tool_names.clone(), options),
                thinking: ToolSieve::with_options(tool_names, options),
            })
        } else {
            debug!("Tool call sieving disabled for this stream; passing text through");
            None
        };
        Self {
            policy,
            sieves,
            saw_tool_calls: false,
        }
    }

    pub fn is_sieving(&self) -> bool {
        self.sieves.is_some()
    }

    pub fn saw_tool_calls(&self) -> bool {
        self.saw_tool_calls
    }

    pub fn finish_reason(&self) -> FinishReason {
        if self.saw_tool_calls {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        }
    }

    pub fn push(&mut self, part: &StreamPart) -> Vec<ChannelEvent> {
        if part.text.is_empty() {
            return Vec::new();
        }
        let events = match self.sieves.as_mut() {
            Some(sieves) => match part.channel {
                Channel::Content => sieves.content.process_chunk(&part.text),
                Channel::Thinking => sieves.thinking.process_chunk(&part.text),
            },
            None => vec![ToolStreamEvent::Content(part.text.clone())],
        };
        self.tag(part.channel, events)
    }

    /// Flush both channels, content first.
    pub fn finish(mut self) -> FinishedStream {
        let mut events = Vec::new();
        if let Some(sieves) = self.sieves.take() {
            let content = sieves.content.flush();
            events.extend(self.tag(Channel::Content, content));
            let thinking = sieves.thinking.flush();
            events.extend(self.tag(Channel::Thinking, thinking));
        }
        FinishedStream {
            events,
            finish_reason: self.finish_reason(),
        }
    }

    fn tag(&mut self, channel: Channel, events: Vec<ToolStreamEvent>) -> Vec<ChannelEvent> {
        let emit_deltas = self.policy.emit_deltas;
        let mut saw_tool_calls = false;
        let tagged = events
            .into_iter()
            .filter(|event| emit_deltas || !matches!(event, ToolStreamEvent::ToolCallDeltas(_)))
            .inspect(|event| saw_tool_calls |= !matches!(event, ToolStreamEvent::Content(_)))
            .map(|event| ChannelEvent { channel, event })
            .collect();
        self.saw_tool_calls |= saw_tool_calls;
        tagged
    }
}
