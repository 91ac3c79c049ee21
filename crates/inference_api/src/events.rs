use serde::{Deserialize, Serialize};

/// Why the backend stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map both OpenAI-style and Anthropic-style stop reasons.
    pub fn parse(value: &str) -> Self {
        match value {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Other(value) => value,
        }
    }
}

/// Best-effort token counters; `None` when the backend did not report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

impl Usage {
    pub fn is_unknown(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none()
    }

    pub fn total_tokens(&self) -> Option<u64> {
        Some(self.prompt_tokens? + self.completion_tokens?)
    }
}

/// Incremental tool-call fragment, forwarded as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u64,
    pub call_id: Option<String>,
    pub tool_name: Option<String>,
    pub arguments: String,
}

/// Canonical event surfaced to the consumer.
///
/// Every connection yields exactly one `Metadata` first and exactly one of
/// `Finish` or `Error` last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    Metadata {
        backend_id: String,
        started_at_ms: u64,
    },
    TextDelta {
        text: String,
    },
    ToolCall(ToolCallDelta),
    Finish {
        reason: FinishReason,
        usage: Option<Usage>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}

/// Folds an event sequence into the assembled reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAccumulator {
    pub backend_id: Option<String>,
    pub text: String,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish: Option<(FinishReason, Option<Usage>)>,
    pub error: Option<String>,
}

impl EventAccumulator {
    pub fn push(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Metadata { backend_id, .. } => {
                self.backend_id = Some(backend_id.clone());
            }
            StreamEvent::TextDelta { text } => self.text.push_str(text),
            StreamEvent::ToolCall(delta) => self.tool_calls.push(delta.clone()),
            StreamEvent::Finish { reason, usage } => {
                self.finish = Some((reason.clone(), *usage));
            }
            StreamEvent::Error { message } => self.error = Some(message.clone()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.finish.is_some() || self.error.is_some()
    }
}
