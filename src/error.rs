//! Error types for the WebSocket client

use std::io;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket client error types
///
/// There is no "invalid frame" variant: the decoder accepts any frame whose
/// length fields are self-consistent. Waiting for more bytes is `None`, not an
/// error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Endpoint string does not start with `ws://` or `wss://`
    #[error("invalid scheme in {0:?}: expected ws:// or wss://")]
    InvalidScheme(String),

    /// Endpoint string has a valid scheme but is otherwise malformed
    #[error("invalid URL: {0}")]
    InvalidUrl(&'static str),

    /// Server answered the upgrade request without `101`
    #[error("handshake failed: {}", status_line(.headers))]
    HandshakeFailed {
        /// Raw response header block, kept for diagnostics
        headers: String,
    },

    /// Connect and upgrade did not finish within the configured timeout
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// I/O error from the underlying socket
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Server announced a frame larger than `Config::max_frame_size`
    #[error("frame too large: {len} bytes announced, limit is {max}")]
    FrameTooLarge {
        /// Payload length from the frame header
        len: u64,
        /// Configured limit
        max: usize,
    },

    /// Connection is already closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation is not allowed in the current connection state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Raw response headers, if this is a handshake rejection
    pub fn handshake_headers(&self) -> Option<&str> {
        match self {
            Error::HandshakeFailed { headers } => Some(headers),
            _ => None,
        }
    }
}

fn status_line(headers: &str) -> &str {
    headers.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_failed_display_uses_status_line() {
        let err = Error::HandshakeFailed {
            headers: "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".into(),
        };
        assert_eq!(err.to_string(), "handshake failed: HTTP/1.1 200 OK");
        assert!(err.handshake_headers().unwrap().contains("Content-Length"));
    }

    #[test]
    fn test_frame_too_large_display() {
        let err = Error::FrameTooLarge { len: 1 << 40, max: 1024 };
        assert_eq!(
            err.to_string(),
            "frame too large: 1099511627776 bytes announced, limit is 1024"
        );
    }

    #[test]
    fn test_io_error_converts_to_transport() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.handshake_headers().is_none());
    }
}
