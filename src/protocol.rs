//! Inbound frame dispatch
//!
//! Decodes as many frames as the receive buffer holds and applies the client's
//! opcode policy:
//! - Ping: a masked Pong with the same payload is queued, nothing is surfaced
//! - Close: the stream stops; no close frame is sent back
//! - Text with FIN set: surfaced as a message
//! - Everything else (binary, continuation, non-final, pong, reserved) is
//!   dropped; fragmented messages are never reassembled
//!
//! A header announcing more than `max_frame_size` payload bytes is an error.

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::error::Result;
use crate::frame::{Frame, OpCode, decode_frame_limited, encode_client_frame};

/// Outcome of one dispatched frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Complete text message
    Text(String),
    /// Server sent a close frame
    Close,
}

/// Client-side protocol handler
///
/// Owns the receive buffer. Bytes are appended in arrival order and frames
/// are consumed from the front.
#[derive(Debug)]
pub struct Protocol {
    read_buf: BytesMut,
    max_frame_size: usize,
    closed: bool,
}

impl Protocol {
    /// Create a new protocol handler
    pub fn new(read_buffer_size: usize, max_frame_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(read_buffer_size),
            max_frame_size,
            closed: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.read_buf.extend_from_slice(data);
    }

    /// Drop everything buffered
    pub fn discard(&mut self) {
        self.read_buf.clear();
    }

    /// Decode and dispatch every complete frame in the buffer
    ///
    /// Text messages and the close notice are pushed to `inbound` in arrival
    /// order; pong replies are encoded into `replies`. Processing stops at the
    /// first close frame and the rest of the buffer is discarded.
    ///
    /// An oversized frame header stops processing with `FrameTooLarge`; what
    /// was decoded before it stays in `inbound`.
    pub fn process_into(&mut self, inbound: &mut Vec<Inbound>, replies: &mut BytesMut) -> Result<()> {
        while !self.closed {
            let Some(frame) = decode_frame_limited(&mut self.read_buf, self.max_frame_size)? else {
                break;
            };
            if let Some(msg) = self.handle_frame(frame, replies) {
                inbound.push(msg);
            }
        }
        Ok(())
    }

    /// Convenience wrapper around [`Protocol::process_into`]
    pub fn process(&mut self, replies: &mut BytesMut) -> Result<Vec<Inbound>> {
        let mut inbound = Vec::new();
        self.process_into(&mut inbound, replies)?;
        Ok(inbound)
    }

    fn handle_frame(&mut self, frame: Frame, replies: &mut BytesMut) -> Option<Inbound> {
        match frame.opcode {
            OpCode::Ping => {
                trace!(len = frame.payload.len(), "ping received, replying with pong");
                encode_client_frame(replies, OpCode::Pong, &frame.payload);
                None
            }
            OpCode::Close => {
                debug!("close frame received");
                self.closed = true;
                self.read_buf.clear();
                Some(Inbound::Close)
            }
            OpCode::Text if frame.fin => Some(Inbound::Text(frame.text_lossy())),
            opcode => {
                trace!(
                    ?opcode,
                    fin = frame.fin,
                    len = frame.payload.len(),
                    "ignoring frame"
                );
                None
            }
        }
    }
}
