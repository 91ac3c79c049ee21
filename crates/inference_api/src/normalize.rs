use crate::codec::{self, MarkerStatus};
use crate::error::NormalizeError;
use crate::message::{
    CanonicalContent, CanonicalMessage, CanonicalPart, ContentItem, ImageItem, ImagePart,
    ImagePayload, Message, MessageBody, Role,
};

/// Normalize a whole conversation.
///
/// Fails on the first unsupported content item; no partial output is
/// returned.
pub fn normalize(conversation: &[Message]) -> Result<Vec<CanonicalMessage>, NormalizeError> {
    conversation
        .iter()
        .enumerate()
        .map(|(index, message)| normalize_message(index, message))
        .collect()
}

/// Normalize one message. `message_index` is only used for error reporting.
pub fn normalize_message(
    message_index: usize,
    message: &Message,
) -> Result<CanonicalMessage, NormalizeError> {
    let content = match &message.content {
        MessageBody::Text(text) => CanonicalContent::Text(text.clone()),
        MessageBody::Items(items) => CanonicalContent::Parts(
            items
                .iter()
                .enumerate()
                .map(|(item_index, item)| normalize_item(message_index, item_index, item))
                .collect::<Result<_, _>>()?,
        ),
    };

    // Tool results supersede whatever textual or image content was sent.
    if !message.tool_results.is_empty() {
        return Ok(CanonicalMessage {
            role: Role::Tool,
            content: CanonicalContent::ToolResults(message.tool_results.clone()),
        });
    }

    Ok(CanonicalMessage {
        role: message.role,
        content,
    })
}

fn normalize_item(
    message_index: usize,
    item_index: usize,
    item: &ContentItem,
) -> Result<CanonicalPart, NormalizeError> {
    match item {
        ContentItem::Text(text) => Ok(CanonicalPart::Text { text: text.clone() }),
        ContentItem::Image(image) => Ok(CanonicalPart::Image(normalize_image(image))),
        ContentItem::Unsupported(_) => Err(NormalizeError::UnsupportedContentKind {
            message_index,
            item_index,
            kind: item.kind(),
        }),
    }
}

fn normalize_image(image: &ImageItem) -> ImagePart {
    match &image.payload {
        ImagePayload::Raw(bytes) => ImagePart {
            encoded_payload: codec::encode(bytes),
            mime_type: image
                .mime_hint
                .clone()
                .unwrap_or_else(|| codec::DEFAULT_RAW_IMAGE_MIME_TYPE.to_owned()),
        },
        ImagePayload::Encoded(text) => {
            let stripped = codec::detect_and_strip_marker(text);
            let mime_type = match (stripped.marker, &image.mime_hint) {
                (MarkerStatus::Recognized, _) | (_, None) => stripped.mime_type.to_owned(),
                (_, Some(hint)) => hint.clone(),
            };
            ImagePart {
                encoded_payload: stripped.payload.to_owned(),
                mime_type,
            }
        }
    }
}
