//! Streaming chat-completion client primitives.
//!
//! This crate turns a caller's conversation into a canonical, wire-ready form
//! and decodes a backend's server-sent event stream into an ordered sequence
//! of [`StreamEvent`]s: one `Metadata`, any number of deltas, then exactly one
//! `Finish` or `Error`.
//!
//! The layers are usable on their own:
//! - [`codec`] and [`normalize`] prepare messages, images included.
//! - [`sse`] and [`translate`] decode raw bytes into events.
//! - [`controller`] drives one connection's read loop with cancellation.
//! - [`client`] owns HTTP transport against OpenAI-compatible endpoints.

pub mod client;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod headers;
pub mod message;
pub mod normalize;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod translate;
pub mod url;

pub use client::InferenceClient;
pub use codec::{decode, detect_and_strip_marker, encode, MarkerStatus};
pub use config::BackendConfig;
pub use controller::{CancellationSignal, EventStream, StreamController};
pub use error::{CodecError, InferenceApiError, NormalizeError};
pub use events::{EventAccumulator, FinishReason, StreamEvent, ToolCallDelta, Usage};
pub use message::{
    CanonicalContent, CanonicalMessage, CanonicalPart, ContentItem, Conversation, Message,
    MessageBody, Role, ToolResult,
};
pub use normalize::normalize;
pub use payload::{ChatCompletionRequest, ImageWireFormat};
pub use retry::RetryPolicy;
pub use sse::FrameDecoder;
pub use translate::EventTranslator;
pub use url::normalize_chat_url;
