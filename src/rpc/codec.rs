//! Newline-delimited JSON framing for stdio transports.
//!
//! Each frame is one line holding one JSON-RPC envelope. Lines are split on
//! the `\n` byte before any text decoding, so lines that are not envelopes
//! (banners, stray log output, non-UTF-8 noise) decode as [`Frame::Garbage`]
//! and lines longer than the frame limit are skipped as [`Frame::Oversized`].
//! Neither tears the stream down.

use super::envelope::RpcEnvelope;
use bytes::{Buf, BufMut, BytesMut};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum accepted frame length in bytes.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// A decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A well-formed envelope.
    Envelope(RpcEnvelope),
    /// A non-empty line that is not an envelope. Invalid UTF-8 is replaced
    /// lossily.
    Garbage(String),
    /// A line longer than the codec limit. Its bytes are dropped up to the
    /// next newline.
    Oversized,
}

/// Errors raised while framing.
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("frame I/O error: {0}")]
    Io(Arc<std::io::Error>),
    /// An outgoing envelope encoded to more bytes than the codec accepts.
    #[error("frame of {length} bytes exceeds the {max} byte limit")]
    FrameTooLong {
        /// Encoded length of the rejected frame.
        length: usize,
        /// Codec limit.
        max: usize,
    },
    /// An outgoing envelope could not be serialised.
    #[error("failed to encode envelope: {0}")]
    Encode(Arc<serde_json::Error>),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Codec turning byte streams into [`Frame`]s and envelopes into lines.
#[derive(Debug)]
pub struct JsonLineCodec {
    max_length: usize,
    // Bytes already scanned for a newline in the pending line.
    next_index: usize,
    discarding: bool,
}

impl JsonLineCodec {
    /// Creates a codec bounded by [`MAX_FRAME_LENGTH`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LENGTH)
    }

    /// Creates a codec bounded by `max_length` bytes per line, excluding the
    /// newline.
    #[must_use]
    pub const fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Returns the per-line limit in bytes.
    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    /// Drops bytes up to and including the next newline. Returns whether the
    /// end of the oversized line was found.
    fn skip_discarded(&mut self, src: &mut BytesMut) -> bool {
        match src.iter().position(|byte| *byte == b'\n') {
            Some(offset) => {
                src.advance(offset + 1);
                self.discarding = false;
                true
            }
            None => {
                src.clear();
                false
            }
        }
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(bytes: &[u8]) -> Option<Frame> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        let lossy = String::from_utf8_lossy(bytes);
        let trimmed = lossy.trim();
        return (!trimmed.is_empty()).then(|| Frame::Garbage(trimmed.to_owned()));
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match serde_json::from_str::<RpcEnvelope>(trimmed) {
        Ok(envelope) => Frame::Envelope(envelope),
        Err(_) => Frame::Garbage(trimmed.to_owned()),
    })
}

impl Decoder for JsonLineCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.discarding && !self.skip_discarded(src) {
                return Ok(None);
            }
            let window_end = src.len().min(self.max_length.saturating_add(1));
            let newline = src
                .get(self.next_index..window_end)
                .and_then(|window| window.iter().position(|byte| *byte == b'\n'));
            match newline {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let mut line = src.split_to(end + 1);
                    line.truncate(end);
                    if let Some(frame) = parse_line(&line) {
                        return Ok(Some(frame));
                    }
                }
                None if src.len() > self.max_length => {
                    self.next_index = 0;
                    self.discarding = true;
                    return Ok(Some(Frame::Oversized));
                }
                None => {
                    self.next_index = window_end;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(parse_line(&rest))
    }
}

impl Encoder<RpcEnvelope> for JsonLineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: RpcEnvelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&item).map_err(|err| FrameError::Encode(Arc::new(err)))?;
        if json.len() > self.max_length {
            return Err(FrameError::FrameTooLong {
                length: json.len(),
                max: self.max_length,
            });
        }
        dst.reserve(json.len() + 1);
        dst.put_slice(json.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::envelope::RequestId;
    use serde_json::json;

    fn decode_all(input: &str) -> Vec<Frame> {
        let mut codec = JsonLineCodec::new();
        let mut buffer = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode_eof(&mut buffer).expect("decoding succeeds") {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn decodes_envelopes_and_skips_blank_lines() {
        let frames = decode_all(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n\
             {\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n",
        );

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames.first(), Some(Frame::Envelope(_))));
    }

    #[test]
    fn banner_lines_decode_as_garbage() {
        let frames = decode_all("mock slack server ready\n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}\n");

        assert_eq!(
            frames.first(),
            Some(&Frame::Garbage("mock slack server ready".to_owned()))
        );
        assert!(matches!(frames.get(1), Some(Frame::Envelope(_))));
    }

    #[test]
    fn partial_lines_wait_for_more_input() {
        let mut codec = JsonLineCodec::new();
        let mut buffer = BytesMut::from("{\"jsonrpc\":\"2.0\",");

        let frame = codec.decode(&mut buffer).expect("decoding succeeds");

        assert!(frame.is_none());
    }

    #[test]
    fn encodes_one_envelope_per_line() {
        let mut codec = JsonLineCodec::new();
        let mut buffer = BytesMut::new();
        codec
            .encode(
                RpcEnvelope::request(RequestId::from(1), "ping", Some(json!({}))),
                &mut buffer,
            )
            .expect("encoding succeeds");

        let text = String::from_utf8(buffer.to_vec()).expect("utf-8 output");
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
    }

    #[test]
    fn invalid_utf8_lines_decode_as_lossy_garbage() {
        let mut codec = JsonLineCodec::new();
        let mut buffer = BytesMut::from(&b"log \xff\xfe latin1 noise\n"[..]);
        buffer.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}\n");

        let first = codec.decode(&mut buffer).expect("decoding succeeds");
        let second = codec.decode(&mut buffer).expect("decoding succeeds");

        assert_eq!(
            first,
            Some(Frame::Garbage("log \u{fffd}\u{fffd} latin1 noise".to_owned()))
        );
        assert!(matches!(second, Some(Frame::Envelope(_))));
    }

    #[test]
    fn oversized_lines_are_skipped_and_the_stream_continues() {
        let mut codec = JsonLineCodec::with_max_length(64);
        let mut buffer = BytesMut::from("x".repeat(100).as_str());

        assert_eq!(
            codec.decode(&mut buffer).expect("decoding succeeds"),
            Some(Frame::Oversized)
        );
        assert_eq!(codec.decode(&mut buffer).expect("decoding succeeds"), None);

        buffer.extend_from_slice(b"yyyy\n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}\n");
        let next = codec.decode(&mut buffer).expect("decoding succeeds");

        assert!(matches!(next, Some(Frame::Envelope(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn lines_at_the_limit_are_accepted() {
        let envelope = "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}";
        let mut codec = JsonLineCodec::with_max_length(envelope.len());
        let mut buffer = BytesMut::from(format!("{envelope}\n").as_str());

        let frame = codec.decode(&mut buffer).expect("decoding succeeds");

        assert!(matches!(frame, Some(Frame::Envelope(_))));
    }

    #[test]
    fn unterminated_final_line_decodes_at_eof() {
        let frames = decode_all("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}");

        assert!(matches!(frames.as_slice(), [Frame::Envelope(_)]));
    }

    #[test]
    fn oversized_outgoing_envelopes_are_rejected() {
        let mut codec = JsonLineCodec::with_max_length(16);
        let mut buffer = BytesMut::new();

        let result = codec.encode(
            RpcEnvelope::request(RequestId::from(1), "ping", Some(json!({"q": "long"}))),
            &mut buffer,
        );

        assert!(matches!(result, Err(FrameError::FrameTooLong { max: 16, .. })));
        assert!(buffer.is_empty());
    }
}
