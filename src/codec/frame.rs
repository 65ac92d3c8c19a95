//! Varint length-prefixed framing.
//!
//! Each frame on the wire is `varint(len) || payload`, where `payload` is
//! plaintext before session keys exist and `ChaCha20-Poly1305` ciphertext
//! (tag included) afterward. This module only knows about the length
//! prefix; it is blind to what the payload bytes mean.

use bytes::{Buf, BytesMut};
use prost::DecodeError;
use prost::encoding::{decode_varint, encode_varint};

/// Accumulates bytes read off the socket and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-read socket bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull the next complete frame's payload out of the buffer, if one has
    /// fully arrived. Returns `Ok(None)` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<BytesMut>, DecodeError> {
        let mut cursor = &self.buf[..];
        let before = cursor.len();
        let len = match decode_varint(&mut cursor) {
            Ok(len) => len,
            Err(_) => return Ok(None),
        };
        let prefix_len = before - cursor.len();
        let len = usize::try_from(len).map_err(|_| DecodeError::new("frame length overflow"))?;

        if cursor.len() < len {
            return Ok(None);
        }

        self.buf.advance(prefix_len);
        Ok(Some(self.buf.split_to(len)))
    }
}

/// Prefix `payload` with its varint-encoded length.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    encode_varint(payload.len() as u64, &mut out);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_frame() {
        let frame = encode_frame(b"hello");
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame);
        let payload = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn waits_for_a_partial_frame() {
        let frame = encode_frame(b"hello world");
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame[..3]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.extend(&frame[3..]);
        let payload = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&payload[..], b"hello world");
    }

    #[test]
    fn decodes_several_frames_delivered_together() {
        let mut bytes = encode_frame(b"one");
        bytes.extend(encode_frame(b"two"));
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], b"one");
        assert_eq!(&decoder.next_frame().unwrap().unwrap()[..], b"two");
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_payload_round_trips() {
        let frame = encode_frame(b"");
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame);
        assert_eq!(decoder.next_frame().unwrap().unwrap().len(), 0);
    }
}
