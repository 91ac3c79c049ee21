//! Conversation history as received from the chat UI, and the canonical
//! backend-agnostic shape it is normalized into.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Ordered chat history owned by the caller.
pub type Conversation = Vec<Message>;

/// One client-side chat message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageBody,
    /// Prior tool invocations; when non-empty these replace `content`.
    #[serde(default, rename = "toolInvocations", alias = "toolResults")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageBody::Text(text.into()),
            tool_results: Vec::new(),
        }
    }

    pub fn with_items(role: Role, items: Vec<ContentItem>) -> Self {
        Self {
            role,
            content: MessageBody::Items(items),
            tool_results: Vec::new(),
        }
    }

    pub fn with_tool_results(mut self, tool_results: Vec<ToolResult>) -> Self {
        self.tool_results = tool_results;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Items(Vec<ContentItem>),
}

/// One segment of a multimodal message.
///
/// Shapes the normalizer cannot handle are kept as [`ContentItem::Unsupported`]
/// so the failure can point at the offending index instead of failing the
/// whole deserialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(String),
    Image(ImageItem),
    Unsupported(Value),
}

impl ContentItem {
    pub fn image_text(payload: impl Into<String>) -> Self {
        Self::Image(ImageItem {
            payload: ImagePayload::Encoded(payload.into()),
            mime_hint: None,
        })
    }

    pub fn image_bytes(bytes: Vec<u8>, mime_hint: Option<String>) -> Self {
        Self::Image(ImageItem {
            payload: ImagePayload::Raw(bytes),
            mime_hint,
        })
    }

    /// Short label used in error messages.
    pub fn kind(&self) -> String {
        match self {
            Self::Text(_) => "text".to_owned(),
            Self::Image(_) => "image".to_owned(),
            Self::Unsupported(value) => value
                .get("type")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| value_type_name(value).to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub payload: ImagePayload,
    pub mime_hint: Option<String>,
}

/// Image bytes in exactly one representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    /// Base64 text, optionally prefixed by a `data:` marker.
    Encoded(String),
    Raw(Vec<u8>),
}

impl<'de> Deserialize<'de> for ContentItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        content_item_from_value(value).map_err(de::Error::custom)
    }
}

fn content_item_from_value(value: Value) -> Result<ContentItem, String> {
    let object = match value {
        Value::String(text) => return Ok(ContentItem::Text(text)),
        Value::Object(ref object) => object,
        other => return Ok(ContentItem::Unsupported(other)),
    };

    match object.get("type").and_then(Value::as_str) {
        Some("text") => match object.get("text").and_then(Value::as_str) {
            Some(text) => Ok(ContentItem::Text(text.to_owned())),
            None => Ok(ContentItem::Unsupported(value)),
        },
        Some("image") => {
            let mime_hint = object
                .get("mimeType")
                .or_else(|| object.get("mime_type"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
            let encoded = object
                .get("content")
                .or_else(|| object.get("image"))
                .and_then(Value::as_str);

            if let Some(encoded) = encoded {
                return Ok(ContentItem::Image(ImageItem {
                    payload: ImagePayload::Encoded(encoded.to_owned()),
                    mime_hint,
                }));
            }

            let bytes = object
                .get("data")
                .and_then(Value::as_array)
                .and_then(|data| data.iter().map(json_byte).collect::<Option<Vec<u8>>>());
            match bytes {
                Some(bytes) => Ok(ContentItem::Image(ImageItem {
                    payload: ImagePayload::Raw(bytes),
                    mime_hint,
                })),
                None => Ok(ContentItem::Unsupported(value)),
            }
        }
        _ => Ok(ContentItem::Unsupported(value)),
    }
}

fn json_byte(value: &Value) -> Option<u8> {
    value.as_u64().and_then(|byte| u8::try_from(byte).ok())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of an earlier tool invocation; carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(rename = "toolCallId")]
    pub call_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(rename = "args", default)]
    pub arguments: Value,
    #[serde(default)]
    pub result: Value,
}

/// Backend-agnostic message produced fresh for each request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMessage {
    pub role: Role,
    pub content: CanonicalContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalContent {
    Text(String),
    Parts(Vec<CanonicalPart>),
    ToolResults(Vec<ToolResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CanonicalPart {
    Text { text: String },
    Image(ImagePart),
}

/// Bare base64 payload with its MIME type hoisted out of any marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePart {
    #[serde(rename = "image")]
    pub encoded_payload: String,
    pub mime_type: String,
}

impl ImagePart {
    pub fn data_url(&self) -> String {
        codec::to_data_url(&self.mime_type, &self.encoded_payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_ui_wire_shapes() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [
                "describe this",
                {"type": "image", "content": "data:image/png;base64,QUJD"},
                {"type": "text", "text": "thanks"},
                {"type": "audio", "content": "..."}
            ]
        }))
        .expect("message should deserialize");

        let MessageBody::Items(items) = message.content else {
            panic!("expected item list");
        };
        assert_eq!(items[0], ContentItem::Text("describe this".to_owned()));
        assert!(matches!(items[1], ContentItem::Image(_)));
        assert_eq!(items[2], ContentItem::Text("thanks".to_owned()));
        assert_eq!(items[3].kind(), "audio");
        assert!(message.tool_results.is_empty());
    }

    #[test]
    fn raw_image_bytes_deserialize_with_hint() {
        let item: ContentItem = serde_json::from_value(serde_json::json!({
            "type": "image",
            "data": [65, 66, 67],
            "mimeType": "image/gif"
        }))
        .expect("item should deserialize");

        assert_eq!(
            item,
            ContentItem::image_bytes(b"ABC".to_vec(), Some("image/gif".to_owned()))
        );
    }

    #[test]
    fn out_of_range_image_byte_becomes_unsupported_item() {
        let message: Message = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [
                "look",
                {"type": "image", "data": [65, 256, 67]}
            ]
        }))
        .expect("message should still deserialize");

        let MessageBody::Items(items) = message.content else {
            panic!("expected item list");
        };
        assert!(matches!(items[1], ContentItem::Unsupported(_)));
        assert_eq!(items[1].kind(), "image");
    }

    #[test]
    fn canonical_image_part_serializes_with_hoisted_mime() {
        let part = CanonicalPart::Image(ImagePart {
            encoded_payload: "QUJD".to_owned(),
            mime_type: "image/png".to_owned(),
        });
        assert_eq!(
            serde_json::to_value(&part).expect("serialize"),
            serde_json::json!({"type": "image", "image": "QUJD", "mimeType": "image/png"})
        );
    }
}
