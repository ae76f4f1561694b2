//! Connection state machine
//!
//! [`Session`] is the sans-I/O core of a client connection. The transport
//! tells it what happened (connected, bytes arrived, peer closed, I/O failed,
//! caller wants to send or close); it answers with [`Event`]s for the caller
//! and bytes to write, available through [`Session::take_outbound`].
//!
//! ```text
//! Connecting -> Handshaking -> Streaming -> Closed
//!      \             \             \
//!       `-------------`-------------`----> Error
//! ```

use std::io;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::Config;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::frame::{OpCode, encode_client_frame};
use crate::handshake::Handshake;
use crate::protocol::{Inbound, Protocol};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Transport not connected yet
    Connecting,
    /// Upgrade request sent, waiting for `101`
    Handshaking,
    /// Upgraded; frames flow both ways
    Streaming,
    /// Closed by the caller, the server or the transport
    Closed,
    /// Handshake rejected or transport failed
    Error,
}

impl ConnState {
    /// `Closed` and `Error` are final
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed | ConnState::Error)
    }

    fn can_transition_to(self, next: ConnState) -> bool {
        use ConnState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Streaming)
                | (Connecting | Handshaking | Streaming, Closed)
                | (Connecting | Handshaking | Streaming, Error)
        )
    }
}

/// Lifecycle and message notifications, in per-connection arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Transport connected; upgrade request written
    Connect,
    /// Upgrade accepted; carries the raw response headers
    Handshake(String),
    /// Complete text message
    Message(String),
    /// Handshake rejection or transport failure
    Error(String),
    /// Connection closed
    Close,
}

/// Sans-I/O client connection
#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    state: ConnState,
    handshake: Handshake,
    handshake_buf: BytesMut,
    protocol: Protocol,
    write_buf: BytesMut,
    inbound: Vec<Inbound>,
}

impl Session {
    /// Create a session for `endpoint`, in `Connecting`
    pub fn new(endpoint: Endpoint, config: &Config) -> Self {
        Self {
            endpoint,
            state: ConnState::Connecting,
            handshake: Handshake::new(config.max_handshake_size),
            handshake_buf: BytesMut::new(),
            protocol: Protocol::new(config.read_buffer_size, config.max_frame_size),
            write_buf: BytesMut::new(),
            inbound: Vec::new(),
        }
    }

    /// Endpoint this session talks to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// The single transition function; illegal moves are rejected
    fn transition(&mut self, next: ConnState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState("illegal connection state transition"));
        }
        debug!(from = ?self.state, to = ?next, endpoint = %self.endpoint, "state change");
        self.state = next;
        Ok(())
    }

    /// Transport is up: queue the upgrade request
    pub fn on_connected(&mut self, events: &mut Vec<Event>) -> Result<()> {
        self.transition(ConnState::Handshaking)?;
        let request = self.handshake.request(&self.endpoint)?;
        self.write_buf.extend_from_slice(&request);
        events.push(Event::Connect);
        Ok(())
    }

    /// Bytes arrived from the transport
    ///
    /// A handshake rejection or an oversized frame moves the session to
    /// `Error`, pushes [`Event::Error`] and is also returned as the error.
    pub fn on_data(&mut self, data: &[u8], events: &mut Vec<Event>) -> Result<()> {
        match self.state {
            ConnState::Connecting => Err(Error::InvalidState("data before connect")),
            ConnState::Handshaking => {
                self.handshake_buf.extend_from_slice(data);
                match self.handshake.on_response(&mut self.handshake_buf) {
                    Ok(None) => Ok(()),
                    Ok(Some(headers)) => {
                        self.transition(ConnState::Streaming)?;
                        events.push(Event::Handshake(headers));
                        // Frames that arrived together with the response
                        let leftover = self.handshake_buf.split();
                        if leftover.is_empty() {
                            return Ok(());
                        }
                        self.protocol.extend(&leftover);
                        self.dispatch(events)
                    }
                    Err(e) => {
                        warn!(endpoint = %self.endpoint, error = %e, "handshake rejected");
                        self.fail(e.to_string(), events);
                        Err(e)
                    }
                }
            }
            ConnState::Streaming => {
                self.protocol.extend(data);
                self.dispatch(events)
            }
            ConnState::Closed | ConnState::Error => {
                debug!(len = data.len(), "dropping bytes after close");
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, events: &mut Vec<Event>) -> Result<()> {
        let outcome = self
            .protocol
            .process_into(&mut self.inbound, &mut self.write_buf);

        let mut inbound = std::mem::take(&mut self.inbound);
        for msg in inbound.drain(..) {
            match msg {
                Inbound::Text(text) => events.push(Event::Message(text)),
                Inbound::Close => {
                    if self.transition(ConnState::Closed).is_ok() {
                        events.push(Event::Close);
                    }
                }
            }
        }
        self.inbound = inbound;

        if let Err(e) = outcome {
            warn!(endpoint = %self.endpoint, error = %e, "frame rejected");
            self.fail(e.to_string(), events);
            return Err(e);
        }
        Ok(())
    }

    /// Queue a masked text frame
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        match self.state {
            ConnState::Streaming => {
                encode_client_frame(&mut self.write_buf, OpCode::Text, text.as_bytes());
                Ok(())
            }
            ConnState::Closed | ConnState::Error => Err(Error::ConnectionClosed),
            ConnState::Connecting | ConnState::Handshaking => {
                Err(Error::InvalidState("send before handshake completed"))
            }
        }
    }

    /// Caller-initiated close; no-op once closed or failed
    pub fn close(&mut self, events: &mut Vec<Event>) {
        if self.transition(ConnState::Closed).is_ok() {
            self.discard_buffers();
            events.push(Event::Close);
        }
    }

    /// Peer closed the transport (EOF)
    pub fn on_transport_closed(&mut self, events: &mut Vec<Event>) {
        match self.state {
            ConnState::Streaming => self.close(events),
            ConnState::Connecting | ConnState::Handshaking => {
                self.fail("connection closed during handshake".to_string(), events);
            }
            ConnState::Closed | ConnState::Error => {}
        }
    }

    /// Transport I/O failed
    pub fn on_transport_error(&mut self, err: &io::Error, events: &mut Vec<Event>) {
        if self.state.is_terminal() {
            return;
        }
        warn!(endpoint = %self.endpoint, error = %err, "transport error");
        self.fail(err.to_string(), events);
    }

    fn fail(&mut self, detail: String, events: &mut Vec<Event>) {
        if self.transition(ConnState::Error).is_ok() {
            self.discard_buffers();
            events.push(Event::Error(detail));
        }
    }

    fn discard_buffers(&mut self) {
        self.handshake_buf.clear();
        self.protocol.discard();
        self.write_buf.clear();
    }

    /// Take the bytes waiting to be written
    pub fn take_outbound(&mut self) -> Option<Bytes> {
        if self.write_buf.is_empty() {
            None
        } else {
            Some(self.write_buf.split().freeze())
        }
    }
}
