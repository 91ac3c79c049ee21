use std::borrow::Cow;

use tracing::debug;

/// Prefix marking a payload line.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that ends frame production for a connection.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One `data: ` payload line with the prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecoderState {
    #[default]
    Buffering,
    Closed,
}

/// Incremental line decoder for one connection's event stream.
///
/// Chunk boundaries need not line up with lines or even with UTF-8 code
/// points; incomplete trailing data is held until the next chunk.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    pending_utf8: Vec<u8>,
    state: DecoderState,
}

impl FrameDecoder {
    /// Feed arbitrary bytes and drain the frames completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.state == DecoderState::Closed {
            return frames;
        }

        self.push_decoded(bytes);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return frames;
        };
        let remainder = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, remainder);

        for line in complete.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some(data) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            if data == DONE_SENTINEL {
                self.close();
                break;
            }
            if data.trim().is_empty() {
                continue;
            }
            frames.push(Frame {
                data: data.to_owned(),
            });
        }

        frames
    }

    /// Parse a complete payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<Frame> {
        let mut decoder = Self::default();
        let frames = decoder.feed(input.as_bytes());
        decoder.finish();
        frames
    }

    /// Mark the underlying stream as ended, discarding any partial line.
    pub fn finish(&mut self) {
        if self.state == DecoderState::Buffering && !self.is_empty_buffer() {
            debug!(
                discarded_bytes = self.buffer.len() + self.pending_utf8.len(),
                "discarding unterminated trailing frame data"
            );
        }
        self.close();
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == DecoderState::Closed
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && self.pending_utf8.is_empty()
    }

    fn close(&mut self) {
        self.state = DecoderState::Closed;
        self.buffer.clear();
        self.pending_utf8.clear();
    }

    fn push_decoded(&mut self, bytes: &[u8]) {
        let input: Cow<'_, [u8]> = if self.pending_utf8.is_empty() {
            Cow::Borrowed(bytes)
        } else {
            let mut joined = std::mem::take(&mut self.pending_utf8);
            joined.extend_from_slice(bytes);
            Cow::Owned(joined)
        };

        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    return;
                }
                Err(error) => {
                    let (valid, after) = rest.split_at(error.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match error.error_len() {
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid_len..];
                        }
                        None => {
                            // Code point continues in the next chunk.
                            self.pending_utf8.extend_from_slice(after);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frames_incrementally() {
        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();

        frames.extend(decoder.feed(b"data: {\"choices\":[]}\n\n"));
        assert_eq!(frames.len(), 1);

        frames.extend(decoder.feed(b"data: [DONE]\n\n"));
        assert_eq!(frames.len(), 1);
        assert!(decoder.is_closed());
        assert!(decoder.is_empty_buffer());
    }

    #[test]
    fn multibyte_code_point_split_across_chunks_survives() {
        let line = "data: {\"text\":\"héllo ✓\"}\n".as_bytes();
        let split = line
            .iter()
            .position(|byte| *byte == 0xE2)
            .expect("check mark starts with 0xE2")
            + 1;

        let mut decoder = FrameDecoder::default();
        assert!(decoder.feed(&line[..split]).is_empty());
        let frames = decoder.feed(&line[split..]);
        assert_eq!(
            frames,
            vec![Frame {
                data: "{\"text\":\"héllo ✓\"}".to_owned()
            }]
        );
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut decoder = FrameDecoder::default();
        let frames = decoder.feed(b"data: a\xFFb\n");
        assert_eq!(frames[0].data, "a\u{FFFD}b");
    }

    #[test]
    fn crlf_terminators_are_accepted() {
        let frames = FrameDecoder::parse_frames("data: one\r\ndata: two\r\n");
        let data: Vec<_> = frames.into_iter().map(|frame| frame.data).collect();
        assert_eq!(data, vec!["one", "two"]);
    }
}
