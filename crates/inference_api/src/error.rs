use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Failure decoding a transport-encoded payload back into bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Pre-flight failure while normalizing a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("message {message_index} has unsupported content kind '{kind}' at item {item_index}")]
    UnsupportedContentKind {
        message_index: usize,
        item_index: usize,
        kind: String,
    },
}

#[derive(Debug, Error)]
pub enum InferenceApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0} {1}")]
    Status(StatusCode, String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("retry exhausted after max attempts (status: {}, last_error: {last_error:?})", display_status(.status))]
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    #[error("request was cancelled")]
    Cancelled,
}

fn display_status(status: &Option<StatusCode>) -> String {
    status
        .map(|status| status.as_u16().to_string())
        .unwrap_or_else(|| "n/a".to_owned())
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<Value>,
    message: Option<String>,
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        let from_error = match &self.error {
            Some(Value::String(message)) => Some(message.as_str()),
            Some(Value::Object(fields)) => fields.get("message").and_then(Value::as_str),
            _ => None,
        };

        from_error
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(ToOwned::to_owned)
    }
}

/// Derive a human-readable message from a failed response body.
///
/// Only structured `error.message`/`error`/`message` fields are trusted; any
/// other body (HTML from a proxy, plain text, empty) yields a status-based
/// message.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.message())
        .unwrap_or_else(|| status_message(status))
}

fn status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP error! status: {} {reason}", status.as_u16()),
        None => format!("HTTP error! status: {}", status.as_u16()),
    }
}
