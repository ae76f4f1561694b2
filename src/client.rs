//! Tokio WebSocket client
//!
//! Drives a [`Session`] over an async byte stream. `connect*` returns once
//! the upgrade has succeeded or failed; after that a single spawned task owns
//! the socket, writes queued frames and pong replies, and forwards [`Event`]s
//! in arrival order.
//!
//! Writes never hold up the rest of the task: a peer that stops reading
//! stalls only the outbound bytes, and `close()` still tears the socket down.
//! Events go through a channel bounded by `Config::event_capacity`; when the
//! caller falls behind, the task stops reading the socket until there is room.
//! Commands stay unbounded since they come from the caller itself.
//!
//! # Example
//!
//! ```ignore
//! use jforex_ws::{Config, Endpoint, connect_with_stream};
//!
//! // wss:// needs a stream the caller has already secured
//! let endpoint = Endpoint::parse("wss://feed.example.com/ticker")?;
//! let tls = my_tls_connector.connect(&endpoint.host, tcp).await?;
//! let (conn, mut events) = connect_with_stream(tls, endpoint, Config::default()).await?;
//! conn.send("hello")?;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::Config;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::session::{ConnState, Event, Session};

/// Caller requests forwarded to the connection task
#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

/// Handle to a live connection
///
/// Dropping every handle closes the connection.
#[derive(Debug, Clone)]
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnState>,
}

impl Connection {
    /// Current connection state
    pub fn state(&self) -> ConnState {
        *self.state.borrow()
    }

    /// Queue a text message
    ///
    /// Fails with `InvalidState` before the upgrade and with
    /// `ConnectionClosed` once the connection has ended.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        match self.state() {
            ConnState::Streaming => self
                .commands
                .send(Command::Send(text.into()))
                .map_err(|_| Error::ConnectionClosed),
            ConnState::Closed | ConnState::Error => Err(Error::ConnectionClosed),
            ConnState::Connecting | ConnState::Handshaking => {
                Err(Error::InvalidState("send before handshake completed"))
            }
        }
    }

    /// Tear the connection down; safe to call any number of times
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Wait until the connection reaches `Closed` or `Error`
    pub async fn closed(&self) -> ConnState {
        let mut state = self.state.clone();
        match state.wait_for(|s| s.is_terminal()).await {
            Ok(s) => *s,
            // Task gone without publishing a final state
            Err(_) => ConnState::Closed,
        }
    }
}

/// Ordered stream of connection events
///
/// Ends after the connection task finishes.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::Receiver<Event>,
}

impl Events {
    /// Receive the next event
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive the next text message, skipping lifecycle events
    ///
    /// Returns `None` once the connection has closed or failed.
    pub async fn next_message(&mut self) -> Option<String> {
        while let Some(event) = self.rx.recv().await {
            match event {
                Event::Message(text) => return Some(text),
                Event::Close | Event::Error(_) => return None,
                Event::Connect | Event::Handshake(_) => {}
            }
        }
        None
    }
}

impl Stream for Events {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

/// Connect to a `ws://` URL with the default configuration
pub async fn connect(url: &str) -> Result<(Connection, Events)> {
    connect_with_config(url, Config::default()).await
}

/// Connect to a `ws://` URL
///
/// `wss://` endpoints are rejected: TLS is left to the caller, who passes the
/// secured stream to [`connect_with_stream`].
pub async fn connect_with_config(url: &str, config: Config) -> Result<(Connection, Events)> {
    let endpoint = Endpoint::parse(url)?;
    if endpoint.secure {
        return Err(Error::InvalidState(
            "wss:// needs a caller-secured stream, use connect_with_stream",
        ));
    }

    let timeout = config.handshake_timeout;
    with_timeout(timeout, async move {
        let stream = TcpStream::connect(endpoint.authority()).await?;
        stream.set_nodelay(config.nodelay)?;
        debug!(endpoint = %endpoint, "tcp connected");
        start(stream, endpoint, config).await
    })
    .await
}

/// Run the handshake over an already connected (and, for `wss`, secured)
/// stream
pub async fn connect_with_stream<S>(
    stream: S,
    endpoint: Endpoint,
    config: Config,
) -> Result<(Connection, Events)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let timeout = config.handshake_timeout;
    with_timeout(timeout, start(stream, endpoint, config)).await
}

async fn with_timeout<F, T>(timeout: Option<std::time::Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::HandshakeTimeout)?,
        None => fut.await,
    }
}

async fn start<S>(mut stream: S, endpoint: Endpoint, config: Config) -> Result<(Connection, Events)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut session = Session::new(endpoint, &config);
    let mut events = Vec::new();

    session.on_connected(&mut events)?;
    flush_outbound(&mut stream, &mut session).await?;

    let mut buf = BytesMut::with_capacity(config.read_buffer_size);
    while session.state() == ConnState::Handshaking {
        buf.clear();
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            session.on_transport_closed(&mut events);
            return Err(Error::ConnectionClosed);
        }
        session.on_data(&buf, &mut events)?;
    }
    debug!(endpoint = %session.endpoint(), "handshake complete");

    let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
    let (state_tx, state_rx) = watch::channel(session.state());
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let (reader, writer) = tokio::io::split(stream);
    let driver = Driver {
        reader,
        writer,
        session,
        read_buf: buf,
        outbound: BytesMut::new(),
        needs_flush: false,
        pending: events.into(),
        deliver: true,
    };
    tokio::spawn(driver.run(cmd_rx, event_tx, state_tx));

    Ok((
        Connection {
            commands: cmd_tx,
            state: state_rx,
        },
        Events { rx: event_rx },
    ))
}

async fn flush_outbound<S>(stream: &mut S, session: &mut Session) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if let Some(bytes) = session.take_outbound() {
        stream.write_all(&bytes).await?;
        stream.flush().await?;
    }
    Ok(())
}

/// Connection task state
///
/// One decode loop per connection; bytes are handled strictly in arrival
/// order.
struct Driver<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    session: Session,
    read_buf: BytesMut,
    /// Bytes taken from the session, not yet accepted by the socket
    outbound: BytesMut,
    needs_flush: bool,
    /// Events not yet accepted by the channel
    pending: VecDeque<Event>,
    /// Cleared once the caller drops `Events`
    deliver: bool,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        event_tx: mpsc::Sender<Event>,
        state_tx: watch::Sender<ConnState>,
    ) {
        let mut events = Vec::new();
        // Pong replies to pings that arrived with the response
        self.collect_outbound();

        while !self.session.state().is_terminal() {
            self.read_buf.clear();
            let backlog = !self.pending.is_empty();
            let writing = !self.outbound.is_empty() || self.needs_flush;

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = self.session.send_text(&text) {
                            debug!(error = %e, "dropping message");
                        }
                    }
                    // All handles dropped counts as close
                    Some(Command::Close) | None => self.session.close(&mut events),
                },
                read = self.reader.read_buf(&mut self.read_buf), if !backlog => match read {
                    Ok(0) => self.session.on_transport_closed(&mut events),
                    Ok(_) => {
                        if let Err(e) = self.session.on_data(&self.read_buf, &mut events) {
                            debug!(error = %e, "connection failed on inbound data");
                        }
                    }
                    Err(e) => self.session.on_transport_error(&e, &mut events),
                },
                written = write_some(&mut self.writer, &mut self.outbound, &mut self.needs_flush), if writing => {
                    if let Err(e) = written {
                        self.session.on_transport_error(&e, &mut events);
                    }
                }
                permit = event_tx.reserve(), if backlog => match permit {
                    Ok(permit) => {
                        if let Some(event) = self.pending.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => {
                        debug!("event receiver dropped");
                        self.deliver = false;
                        self.pending.clear();
                    }
                },
            }

            self.collect_outbound();
            state_tx.send_replace(self.session.state());
            if self.deliver {
                self.pending.extend(events.drain(..));
            } else {
                events.clear();
            }
        }

        // A stalled write must not hold up teardown
        if self.outbound.is_empty() {
            if let Err(e) = self.writer.shutdown().await {
                debug!(error = %e, "shutdown failed");
            }
        }
        let endpoint = self.session.endpoint().to_string();
        let state = self.session.state();
        drop(self.reader);
        drop(self.writer);

        for event in self.pending {
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
        debug!(endpoint = %endpoint, state = ?state, "connection task finished");
    }

    fn collect_outbound(&mut self) {
        if let Some(bytes) = self.session.take_outbound() {
            self.outbound.extend_from_slice(&bytes);
        }
    }
}

/// Write what the socket accepts without blocking on the rest, or flush once
/// everything is written
///
/// Cancel safe: bytes leave `outbound` only after the socket took them.
async fn write_some<W>(writer: &mut W, outbound: &mut BytesMut, needs_flush: &mut bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if outbound.is_empty() {
        writer.flush().await?;
        *needs_flush = false;
        return Ok(());
    }
    let n = writer.write(&outbound[..]).await?;
    if n == 0 {
        return Err(io::ErrorKind::WriteZero.into());
    }
    outbound.advance(n);
    *needs_flush = true;
    Ok(())
}
