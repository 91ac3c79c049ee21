//! Textual transport encoding for binary image payloads.
//!
//! Images travel either as raw bytes or as base64 text, optionally wrapped in a
//! `data:<mime>;base64,` marker. This module converts between the two and
//! hoists the MIME type out of the marker so the rest of the pipeline only sees
//! bare payloads.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

use crate::error::CodecError;

/// MIME type reported when a payload carries no recognizable marker.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";
/// MIME type assumed for raw image bytes that arrive without a hint.
pub const DEFAULT_RAW_IMAGE_MIME_TYPE: &str = "image/jpeg";

const MARKER_PREFIX: &str = "data:";
const BASE64_SEPARATOR: &str = ";base64,";

/// Closed set of image formats whose markers are recognized.
pub const KNOWN_IMAGE_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Standard alphabet, padded on encode, lenient about padding and trailing bits
/// on decode so best-effort suffixes of malformed markers stay decodable.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// How [`detect_and_strip_marker`] classified its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStatus {
    /// A known `data:<mime>;base64,` marker was stripped.
    Recognized,
    /// The input had no `data:` prefix and was returned unchanged.
    Absent,
    /// A `data:` prefix was present but not a known marker.
    Malformed,
}

/// Payload with its marker stripped and the MIME type hoisted out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrippedPayload<'a> {
    pub mime_type: &'static str,
    pub payload: &'a str,
    pub marker: MarkerStatus,
}

/// Encode arbitrary bytes as standard padded base64.
pub fn encode(bytes: &[u8]) -> String {
    ENGINE.encode(bytes)
}

/// Exact inverse of [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(ENGINE.decode(text)?)
}

/// Build the `data:<mime>;base64,<payload>` marker form.
pub fn to_data_url(mime_type: &str, payload: &str) -> String {
    format!("{MARKER_PREFIX}{mime_type}{BASE64_SEPARATOR}{payload}")
}

/// Recognize and strip a known image marker.
///
/// Never fails: unknown or malformed markers yield the default MIME type and
/// the longest suffix of the payload that still decodes.
pub fn detect_and_strip_marker(text: &str) -> StrippedPayload<'_> {
    let Some(rest) = text.strip_prefix(MARKER_PREFIX) else {
        return StrippedPayload {
            mime_type: DEFAULT_IMAGE_MIME_TYPE,
            payload: text,
            marker: MarkerStatus::Absent,
        };
    };

    for mime_type in KNOWN_IMAGE_MIME_TYPES {
        if let Some(payload) = rest
            .strip_prefix(mime_type)
            .and_then(|after| after.strip_prefix(BASE64_SEPARATOR))
        {
            return StrippedPayload {
                mime_type,
                payload,
                marker: MarkerStatus::Recognized,
            };
        }
    }

    let candidate = match rest.find(',') {
        Some(comma) => &rest[comma + 1..],
        None => rest,
    };
    StrippedPayload {
        mime_type: DEFAULT_IMAGE_MIME_TYPE,
        payload: longest_decodable_suffix(candidate),
        marker: MarkerStatus::Malformed,
    }
}

fn longest_decodable_suffix(candidate: &str) -> &str {
    let unpadded = candidate.trim_end_matches('=');
    let start = unpadded
        .char_indices()
        .rev()
        .find(|(_, ch)| !is_base64_symbol(*ch))
        .map(|(index, ch)| index + ch.len_utf8())
        .unwrap_or(0);

    let mut symbols = &unpadded[start..];
    // A single dangling symbol can never decode; every other remainder can.
    if symbols.len() % 4 == 1 {
        symbols = &symbols[1..];
    }
    if symbols.is_empty() {
        return symbols;
    }

    let with_padding = &candidate[unpadded.len() - symbols.len()..];
    if ENGINE.decode(with_padding).is_ok() {
        with_padding
    } else {
        symbols
    }
}

fn is_base64_symbol(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '+' || ch == '/'
}
