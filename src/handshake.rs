//! WebSocket opening handshake (client side)
//!
//! Builds the HTTP/1.1 Upgrade request and checks the server's answer. The
//! only acceptance criterion is `" 101 "` in the status line;
//! `Sec-WebSocket-Accept` is not verified.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

/// Terminator of the response header block
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Marker looked for in the status line
const SWITCHING_PROTOCOLS: &str = " 101 ";

/// Handshake progress for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Request not written yet
    NotStarted,
    /// Request written, waiting for the header block
    AwaitingResponse,
    /// `101` received
    Upgraded,
    /// Anything else received, or the header block grew too large
    Failed,
}

/// Generate a random `Sec-WebSocket-Key` (base64 of 16 random bytes)
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::rng().random();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Build a WebSocket upgrade request
pub fn build_request(endpoint: &Endpoint, key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(160 + endpoint.path.len() + endpoint.host.len());

    buf.put_slice(b"GET ");
    buf.put_slice(endpoint.path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    buf.put_slice(b"Host: ");
    buf.put_slice(endpoint.authority().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Key: ");
    buf.put_slice(key.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Sec-WebSocket-Version: 13\r\n");
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Check the response buffered so far
///
/// - `Ok(None)`: header block not complete yet, `buf` untouched
/// - `Ok(Some(headers))`: `101` seen; the header block is removed from `buf`
///   and anything after it stays there as the start of the frame stream
/// - `Err(HandshakeFailed)`: complete header block without `101`
pub fn parse_response(buf: &mut BytesMut) -> Result<Option<String>> {
    let Some(end) = find_terminator(buf) else {
        return Ok(None);
    };

    let block = buf.split_to(end + HEADER_TERMINATOR.len());
    let headers = String::from_utf8_lossy(&block).into_owned();
    let status_line = headers.lines().next().unwrap_or_default();

    if status_line.contains(SWITCHING_PROTOCOLS) {
        Ok(Some(headers))
    } else {
        Err(Error::HandshakeFailed { headers })
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// One handshake attempt
///
/// Owns the key and tracks [`HandshakeState`]; a `Handshake` is used once and
/// never restarted.
#[derive(Debug)]
pub struct Handshake {
    key: String,
    state: HandshakeState,
    max_header_size: usize,
}

impl Handshake {
    /// New attempt with a fresh random key
    pub fn new(max_header_size: usize) -> Self {
        Self {
            key: generate_key(),
            state: HandshakeState::NotStarted,
            max_header_size,
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Produce the request bytes and start waiting for the response
    pub fn request(&mut self, endpoint: &Endpoint) -> Result<Bytes> {
        if self.state != HandshakeState::NotStarted {
            return Err(Error::InvalidState("handshake already started"));
        }
        self.state = HandshakeState::AwaitingResponse;
        Ok(build_request(endpoint, &self.key))
    }

    /// Feed buffered response bytes
    ///
    /// Same contract as [`parse_response`], plus a size limit: a header block
    /// still unterminated after `max_header_size` bytes fails the attempt.
    pub fn on_response(&mut self, buf: &mut BytesMut) -> Result<Option<String>> {
        if self.state != HandshakeState::AwaitingResponse {
            return Err(Error::InvalidState("no handshake response expected"));
        }

        match parse_response(buf) {
            Ok(Some(headers)) => {
                self.state = HandshakeState::Upgraded;
                Ok(Some(headers))
            }
            Ok(None) if buf.len() > self.max_header_size => {
                self.state = HandshakeState::Failed;
                let headers = String::from_utf8_lossy(buf).into_owned();
                buf.clear();
                Err(Error::HandshakeFailed { headers })
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }
}
