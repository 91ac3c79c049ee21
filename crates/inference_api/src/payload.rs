use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::message::{CanonicalContent, CanonicalMessage, CanonicalPart, ImagePart, Role};

/// How image parts are rendered in the request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageWireFormat {
    /// `{"type":"image_url","image_url":{"url":"data:..."}}`
    #[default]
    OpenAi,
    /// `{"type":"image","image":"data:..."}`
    QwenVl,
}

impl ImageWireFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open-ai" | "image_url" => Some(Self::OpenAi),
            "qwen-vl" | "qwen_vl" | "qwenvl" => Some(Self::QwenVl),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::QwenVl => "qwen-vl",
        }
    }
}

/// Request body for an OpenAI-compatible streaming chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Value>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Value>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            max_tokens: None,
        }
    }

    /// Render canonical messages, prepending `system_prompt` when present.
    pub fn from_canonical(
        model: impl Into<String>,
        system_prompt: Option<&str>,
        messages: &[CanonicalMessage],
        image_format: ImageWireFormat,
    ) -> Self {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if let Some(system_prompt) = system_prompt.filter(|prompt| !prompt.trim().is_empty()) {
            wire.push(json!({ "role": Role::System.as_str(), "content": system_prompt }));
        }
        for message in messages {
            wire.extend(message_to_wire(message, image_format));
        }
        Self::new(model, wire)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Render one canonical message. Tool messages expand into one wire message
/// per tool result.
pub fn message_to_wire(message: &CanonicalMessage, image_format: ImageWireFormat) -> Vec<Value> {
    let role = message.role.as_str();
    match &message.content {
        CanonicalContent::Text(text) => vec![json!({ "role": role, "content": text })],
        CanonicalContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .map(|part| part_to_wire(part, image_format))
                .collect();
            vec![json!({ "role": role, "content": content })]
        }
        CanonicalContent::ToolResults(results) => results
            .iter()
            .map(|result| {
                let content = match &result.result {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                json!({
                    "role": Role::Tool.as_str(),
                    "tool_call_id": result.call_id,
                    "name": result.tool_name,
                    "content": content,
                })
            })
            .collect(),
    }
}

fn part_to_wire(part: &CanonicalPart, image_format: ImageWireFormat) -> Value {
    match part {
        CanonicalPart::Text { text } => json!({ "type": "text", "text": text }),
        CanonicalPart::Image(image) => image_to_wire(image, image_format),
    }
}

fn image_to_wire(image: &ImagePart, image_format: ImageWireFormat) -> Value {
    let url = image.data_url();
    match image_format {
        ImageWireFormat::OpenAi => json!({ "type": "image_url", "image_url": { "url": url } }),
        ImageWireFormat::QwenVl => json!({ "type": "image", "image": url }),
    }
}
