//! # jforex-ws: WebSocket client for the JForex ticker feed
//!
//! A small hand-rolled WebSocket client: URL resolution, the HTTP/1.1 upgrade
//! handshake, and a frame codec that reassembles frames from a raw byte
//! stream. It speaks exactly what a ticker subscriber needs and no more:
//!
//! - Single-frame text messages (no fragmentation, no extensions)
//! - Automatic pong replies to server pings
//! - A close frame ends the stream without a close frame going back
//! - `101` in the status line is the only handshake acceptance check
//!
//! The codec ([`frame`], [`handshake`], [`protocol`]) and the connection state
//! machine ([`session`]) do no I/O. [`client`] drives them over a tokio socket.
//!
//! ## Example
//!
//! ```ignore
//! use jforex_ws::{Event, connect};
//!
//! let (conn, mut events) = connect("ws://localhost:7081/ticker?instIDs=EURUSD").await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         Event::Message(text) => println!("{text}"),
//!         Event::Close | Event::Error(_) => break,
//!         _ => {}
//!     }
//! }
//! conn.close();
//! ```

use std::time::Duration;

pub mod client;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod protocol;
pub mod session;

pub use client::{Connection, Events, connect, connect_with_config, connect_with_stream};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use frame::{Frame, OpCode};
pub use session::{ConnState, Event, Session};

/// Default ticker endpoint of the JForex bridge
pub const DEFAULT_TICKER_URL: &str = "ws://localhost:7081/ticker";

/// Environment variable that overrides [`DEFAULT_TICKER_URL`]
pub const TICKER_URL_ENV: &str = "JFOREX_WS";

/// Default receive buffer size
pub const RECV_BUFFER_SIZE: usize = 8 * 1024;

/// Default cap on the handshake response header block
pub const MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

/// Default cap on a single frame's payload
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default number of events buffered for a slow [`Events`] reader
pub const EVENT_CAPACITY: usize = 1024;

/// Largest payload carried in the 7-bit length field
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload carried in the 16-bit extended length
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// Configuration for client connections
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use jforex_ws::Config;
///
/// let config = Config::builder()
///     .read_buffer_size(16 * 1024)
///     .handshake_timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.handshake_timeout, Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Initial receive buffer capacity and per-read reserve (default: 8KB)
    pub read_buffer_size: usize,
    /// Response header bytes tolerated before `\r\n\r\n` (default: 8KB)
    pub max_handshake_size: usize,
    /// Largest payload a server frame may announce (default: 16MB)
    pub max_frame_size: usize,
    /// Events held for the caller before reading from the socket pauses
    /// (default: 1024)
    pub event_capacity: usize,
    /// Bound on connect plus upgrade (default: none)
    pub handshake_timeout: Option<Duration>,
    /// Set TCP_NODELAY on sockets opened by [`connect`] (default: true)
    pub nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_buffer_size: RECV_BUFFER_SIZE,
            max_handshake_size: MAX_HANDSHAKE_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            event_capacity: EVENT_CAPACITY,
            handshake_timeout: None,
            nodelay: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for [`Config`]
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the receive buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the handshake response size limit
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.config.max_handshake_size = size;
        self
    }

    /// Set the maximum frame payload size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set how many events may wait for the caller
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Bound connect plus upgrade by `timeout`
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = Some(timeout);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::Config;
    pub use crate::client::{Connection, Events, connect, connect_with_stream};
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Error, Result};
    pub use crate::session::{ConnState, Event};
}
