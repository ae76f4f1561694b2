//! WebSocket frame encoding and decoding
//!
//! Client-side codec for single-frame messages:
//! - Encoding always sets FIN and always masks (client role)
//! - Decoding is incremental: a call either consumes one whole frame from the
//!   front of the buffer or leaves the buffer untouched
//! - Reserved bits are ignored and a masked server frame is unmasked rather
//!   than rejected
//! - The only thing [`decode_frame_limited`] refuses is a payload length above
//!   the caller's limit, so a hostile header cannot make the buffer grow
//!   without bound

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::mask::{apply_mask, generate_mask};
use crate::{MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation frame
    Continuation,
    /// Text frame
    Text,
    /// Binary frame
    Binary,
    /// Connection close
    Close,
    /// Ping
    Ping,
    /// Pong
    Pong,
    /// Any opcode RFC 6455 reserves (0x3-0x7, 0xB-0xF)
    Reserved(u8),
}

impl OpCode {
    /// Parse opcode from the low nibble of a byte
    #[inline]
    pub fn from_u8(byte: u8) -> Self {
        match byte & 0x0F {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }

    /// Wire value
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(n) => n & 0x0F,
        }
    }
}

/// A decoded WebSocket frame (payload already unmasked)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Frame payload
    pub payload: Bytes,
}

impl Frame {
    /// Payload decoded as UTF-8, with invalid sequences replaced
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Size of the header `encode_frame` writes for a payload of `payload_len`
#[inline]
pub fn header_size(payload_len: usize, masked: bool) -> usize {
    let len_ext = if payload_len > MEDIUM_MESSAGE_THRESHOLD {
        8
    } else if payload_len > SMALL_MESSAGE_THRESHOLD {
        2
    } else {
        0
    };
    2 + len_ext + if masked { 4 } else { 0 }
}

/// Encode a single, final frame into `buf`
///
/// With `Some(mask)` the mask bit is set and the payload is written masked.
/// `None` produces a server-style unmasked frame.
pub fn encode_frame(buf: &mut BytesMut, opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) {
    let payload_len = payload.len();
    buf.reserve(header_size(payload_len, mask.is_some()) + payload_len);

    // FIN is always set: no fragmentation on the send side
    buf.put_u8(0x80 | opcode.as_u8());

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    if payload_len <= SMALL_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | payload_len as u8);
    } else if payload_len <= MEDIUM_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(payload_len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(payload_len as u64);
    }

    if let Some(m) = mask {
        buf.put_slice(&m);
        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], m);
    } else {
        buf.put_slice(payload);
    }
}

/// Encode a client frame with a freshly generated mask key
#[inline]
pub fn encode_client_frame(buf: &mut BytesMut, opcode: OpCode, payload: &[u8]) {
    encode_frame(buf, opcode, payload, Some(generate_mask()));
}

/// Decode one frame from the front of `buf`
///
/// Returns `None` when `buf` does not yet hold a complete frame; in that case
/// `buf` is left exactly as it was. On success the frame's bytes are removed
/// and whatever follows stays in `buf`, ready for the next call.
pub fn decode_frame(buf: &mut BytesMut) -> Option<Frame> {
    decode_frame_limited(buf, usize::MAX).ok().flatten()
}

/// [`decode_frame`] with a cap on the announced payload length
///
/// Fails with `FrameTooLarge` as soon as the length field is readable, before
/// any payload bytes are buffered. `buf` is left untouched on error.
pub fn decode_frame_limited(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let b0 = buf[0];
    let b1 = buf[1];

    // RSV1-3 are ignored
    let fin = b0 & 0x80 != 0;
    let opcode = OpCode::from_u8(b0);
    let masked = b1 & 0x80 != 0;
    let len_byte = b1 & 0x7F;

    let (payload_len, mut offset) = match len_byte {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(len), 10)
        }
        n => (n as u64, 2),
    };

    if payload_len > max_frame_size as u64 {
        return Err(Error::FrameTooLarge {
            len: payload_len,
            max: max_frame_size,
        });
    }

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let key = [
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ];
        offset += 4;
        Some(key)
    } else {
        None
    };

    // A length that cannot fit in memory can never complete
    let Some(total) = usize::try_from(payload_len)
        .ok()
        .and_then(|len| offset.checked_add(len))
    else {
        return Ok(None);
    };
    if buf.len() < total {
        return Ok(None);
    }
    let payload_len = total - offset;

    buf.advance(offset);
    let mut payload = buf.split_to(payload_len);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        fin,
        opcode,
        payload: payload.freeze(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_server(opcode: OpCode, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, opcode, payload, None);
        buf
    }

    #[test]
    fn test_opcode() {
        assert_eq!(OpCode::from_u8(0x9), OpCode::Ping);
        assert_eq!(OpCode::from_u8(0xB), OpCode::Reserved(0xB));

        for byte in 0..=0x0F {
            assert_eq!(OpCode::from_u8(byte).as_u8(), byte);
        }
        assert_eq!(OpCode::from_u8(0x81), OpCode::Text);
    }

    #[test]
    fn test_encode_ping_test_text() {
        let mut buf = BytesMut::new();
        encode_client_frame(&mut buf, OpCode::Text, b"ping-test");

        assert_eq!(buf[0], 0x81); // FIN + Text
        assert_eq!(buf[1] & 0x80, 0x80); // Mask bit
        assert_eq!(buf[1] & 0x7F, 9);
        assert_eq!(buf.len(), 2 + 4 + 9);

        let mask = [buf[2], buf[3], buf[4], buf[5]];
        let mut payload = buf[6..].to_vec();
        apply_mask(&mut payload, mask);
        assert_eq!(&payload, b"ping-test");
    }

    #[test]
    fn test_encode_frame_unmasked() {
        let buf = encode_server(OpCode::Text, b"hello");
        assert_eq!(&buf[..], &[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_length_boundaries() {
        // (payload length, 7-bit length field, header size without mask)
        let cases = [
            (0usize, 0u8, 2usize),
            (125, 125, 2),
            (126, 126, 4),
            (65535, 126, 4),
            (65536, 127, 10),
        ];

        for (len, field, header) in cases {
            let payload = vec![0x5a; len];
            let mut buf = BytesMut::new();
            encode_client_frame(&mut buf, OpCode::Binary, &payload);

            assert_eq!(buf[1] & 0x7F, field, "length {len}");
            assert_eq!(buf.len(), header + 4 + len, "length {len}");
            assert_eq!(header_size(len, true), header + 4);

            let frame = decode_frame(&mut buf).unwrap();
            assert_eq!(frame.payload.len(), len);
            assert_eq!(frame.payload, payload);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_round_trip_text_and_binary() {
        for len in [0usize, 1, 5, 124, 125, 126, 127, 1000, 65535, 65536, 70000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
            for opcode in [OpCode::Text, OpCode::Binary] {
                let mut buf = BytesMut::new();
                encode_client_frame(&mut buf, opcode, &payload);

                let frame = decode_frame(&mut buf).unwrap();
                assert!(frame.fin);
                assert_eq!(frame.opcode, opcode);
                assert_eq!(frame.payload.as_ref(), payload.as_slice());
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn test_incomplete_leaves_buffer_untouched() {
        for payload_len in [3usize, 300, 70000] {
            let payload = vec![0x42; payload_len];
            let mut full = BytesMut::new();
            encode_client_frame(&mut full, OpCode::Binary, &payload);

            // Every proper prefix is incomplete and is not consumed
            let cuts = [0, 1, 2, 3, 5, 9, 13, full.len() - 1];
            for cut in cuts.into_iter().filter(|&c| c < full.len()) {
                let mut partial = BytesMut::from(&full[..cut]);
                assert!(decode_frame(&mut partial).is_none(), "cut {cut}");
                assert_eq!(&partial[..], &full[..cut]);
            }
        }
    }

    #[test]
    fn test_split_at_every_boundary() {
        let mut encoded = BytesMut::new();
        encode_client_frame(&mut encoded, OpCode::Text, b"{\"instID\":\"EURUSD\",\"bid\":1.0842}");
        let expected = decode_frame(&mut encoded.clone()).unwrap();

        for split in 1..encoded.len() {
            let mut buf = BytesMut::new();
            let mut frames = Vec::new();

            for chunk in [&encoded[..split], &encoded[split..]] {
                buf.extend_from_slice(chunk);
                while let Some(frame) = decode_frame(&mut buf) {
                    frames.push(frame);
                }
            }

            assert_eq!(frames, vec![expected.clone()], "split at {split}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let payload = vec![7u8; 300];
        let mut encoded = BytesMut::new();
        encode_client_frame(&mut encoded, OpCode::Binary, &payload);

        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for &byte in encoded.iter() {
            buf.put_u8(byte);
            if let Some(frame) = decode_frame(&mut buf) {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut buf = encode_server(OpCode::Text, b"first");
        buf.extend_from_slice(&encode_server(OpCode::Text, b"second"));
        buf.extend_from_slice(&[0x81]); // start of a third frame

        let first = decode_frame(&mut buf).unwrap();
        let second = decode_frame(&mut buf).unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(second.payload.as_ref(), b"second");
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(&buf[..], &[0x81]);
    }

    #[test]
    fn test_reserved_bits_are_ignored() {
        let mut buf = BytesMut::from(&[0xF1, 0x02, b'o', b'k'][..]); // FIN + RSV1-3 + Text
        let frame = decode_frame(&mut buf).unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[test]
    fn test_reserved_opcode_decodes() {
        let mut buf = BytesMut::from(&[0x83, 0x01, 0xAA][..]);
        let frame = decode_frame(&mut buf).unwrap();
        assert_eq!(frame.opcode, OpCode::Reserved(3));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_non_final_frame_keeps_fin_clear() {
        let mut buf = BytesMut::from(&[0x01, 0x03, b'H', b'e', b'l'][..]);
        let frame = decode_frame(&mut buf).unwrap();
        assert!(!frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
    }

    #[test]
    fn test_non_minimal_length_is_accepted() {
        // 5-byte payload announced through the 16-bit extension
        let mut buf = BytesMut::from(&[0x82, 126, 0x00, 0x05, 1, 2, 3, 4, 5][..]);
        let frame = decode_frame(&mut buf).unwrap();
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_header_size_bounds() {
        assert_eq!(header_size(70000, true), 14);
        assert_eq!(header_size(0, false), 2);
    }

    #[test]
    fn test_limit_rejects_announced_length() {
        // 2^40 byte payload announced, nothing of it sent yet
        let mut buf = BytesMut::new();
        buf.put_u8(0x82);
        buf.put_u8(127);
        buf.put_u64(1 << 40);

        match decode_frame_limited(&mut buf, 1024) {
            Err(Error::FrameTooLarge { len, max }) => {
                assert_eq!(len, 1 << 40);
                assert_eq!(max, 1024);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_limit_is_inclusive() {
        let mut buf = encode_server(OpCode::Binary, &[0u8; 1024]);
        let frame = decode_frame_limited(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 1024);

        // Header alone is enough to reject
        let full = encode_server(OpCode::Text, &[b'x'; 200]);
        let mut header = BytesMut::from(&full[..4]);
        assert!(decode_frame_limited(&mut header, 199).is_err());
        let mut header = BytesMut::from(&full[..4]);
        assert!(decode_frame_limited(&mut header, 200).unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_waits_forever() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x82);
        buf.put_u8(127);
        buf.put_u64(u64::MAX);
        buf.put_slice(b"abc");
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 13);
    }
}
