//! Maps decoded upstream frames onto canonical [`StreamEvent`]s.
//!
//! Two backend shapes are recognized: OpenAI-compatible chat completion chunks
//! (`choices[0].delta`) and Anthropic-style message stream events (`type`
//! discriminated). Anything else is skipped rather than rejected.

use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{FinishReason, StreamEvent, ToolCallDelta, Usage};
use crate::sse::Frame;

/// Outcome of translating a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Translated {
    /// Events to forward, in order. Never empty.
    Emit(Vec<StreamEvent>),
    /// Nothing to forward for this frame.
    Skip,
}

/// Per-connection translator; remembers the finish reason and usage counters
/// reported along the way so the terminal event can carry them.
#[derive(Debug, Default)]
pub struct EventTranslator {
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl EventTranslator {
    pub fn translate(&mut self, frame: &Frame) -> Translated {
        self.translate_payload(&frame.data)
    }

    pub fn translate_payload(&mut self, payload: &str) -> Translated {
        let value = match serde_json::from_str::<Value>(payload) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "skipping malformed upstream frame");
                return Translated::Skip;
            }
        };

        if let Some(choices) = value.get("choices").and_then(Value::as_array) {
            return self.translate_chat_chunk(&value, choices);
        }
        // Per-frame error objects are reported but never end the connection.
        if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
            let message = upstream_error_message(error);
            warn!(%message, "skipping in-stream upstream error frame");
            return Translated::Skip;
        }
        if let Some(kind) = value.get("type").and_then(Value::as_str) {
            return self.translate_message_event(kind, &value);
        }

        debug!("skipping unrecognized upstream frame");
        Translated::Skip
    }

    /// Terminal event for a connection that ended normally.
    pub fn finish_event(&self) -> StreamEvent {
        StreamEvent::Finish {
            reason: self.finish_reason.clone().unwrap_or(FinishReason::Stop),
            usage: (!self.usage.is_unknown()).then_some(self.usage),
        }
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    fn translate_chat_chunk(&mut self, value: &Value, choices: &[Value]) -> Translated {
        if let Some(usage) = value.get("usage").filter(|usage| usage.is_object()) {
            self.record_usage(
                read_u64(usage, "prompt_tokens"),
                read_u64(usage, "completion_tokens"),
            );
        }

        let Some(choice) = choices.first() else {
            return Translated::Skip;
        };
        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(FinishReason::parse(reason));
        }

        let mut events = Vec::new();
        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(StreamEvent::text_delta(text));
                }
            }
            if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                events.extend(tool_calls.iter().enumerate().map(|(position, call)| {
                    StreamEvent::ToolCall(chat_tool_call_delta(position, call))
                }));
            }
        }

        emit_or_skip(events)
    }

    fn translate_message_event(&mut self, kind: &str, value: &Value) -> Translated {
        match kind {
            "content_block_delta" => {
                let delta = value.get("delta");
                let text = delta
                    .filter(|delta| delta.get("type").and_then(Value::as_str) == Some("text_delta"))
                    .and_then(|delta| delta.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if text.is_empty() {
                    return Translated::Skip;
                }
                Translated::Emit(vec![StreamEvent::text_delta(text)])
            }
            "message_start" => {
                if let Some(usage) = value.get("message").and_then(|message| message.get("usage")) {
                    self.record_usage(
                        read_u64(usage, "input_tokens"),
                        read_u64(usage, "output_tokens"),
                    );
                }
                Translated::Skip
            }
            "message_delta" => {
                if let Some(reason) = value
                    .get("delta")
                    .and_then(|delta| delta.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    self.finish_reason = Some(FinishReason::parse(reason));
                }
                if let Some(usage) = value.get("usage") {
                    self.record_usage(None, read_u64(usage, "output_tokens"));
                }
                Translated::Skip
            }
            "message_stop" | "content_block_start" | "content_block_stop" | "ping" => {
                Translated::Skip
            }
            other => {
                debug!(event_type = other, "skipping unrecognized upstream event type");
                Translated::Skip
            }
        }
    }

    fn record_usage(&mut self, prompt_tokens: Option<u64>, completion_tokens: Option<u64>) {
        if prompt_tokens.is_some() {
            self.usage.prompt_tokens = prompt_tokens;
        }
        if completion_tokens.is_some() {
            self.usage.completion_tokens = completion_tokens;
        }
    }
}

fn chat_tool_call_delta(position: usize, call: &Value) -> ToolCallDelta {
    let function = call.get("function");
    ToolCallDelta {
        index: call
            .get("index")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64),
        call_id: call
            .get("id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        tool_name: function
            .and_then(|function| function.get("name"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        arguments: function
            .and_then(|function| function.get("arguments"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned(),
    }
}

fn upstream_error_message(error: &Value) -> String {
    let message = match error {
        Value::String(message) => Some(message.as_str()),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| fields.get("type").and_then(Value::as_str)),
        _ => None,
    };
    message
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or("upstream reported an error")
        .to_owned()
}

fn read_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

fn emit_or_skip(events: Vec<StreamEvent>) -> Translated {
    if events.is_empty() {
        Translated::Skip
    } else {
        Translated::Emit(events)
    }
}
