use std::fmt;
use std::io::ErrorKind;
use std::net::TcpStream;

use serde::Serialize;
use thiserror::Error;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

/// Delivery failure; the client is dropped.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Result of polling a client for inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkPoll {
    /// Nothing received
    Idle,
    /// Peer sent something (ping, text), it is alive
    Active,
    /// Peer closed or the connection broke
    Closed,
}

/// Transport of one live client.
pub trait ClientSink: Send {
    /// Deliver one serialized event.
    fn send(&mut self, text: &str) -> Result<(), SinkError>;

    /// Non-blocking check for inbound traffic.
    fn poll(&mut self) -> SinkPoll {
        SinkPoll::Idle
    }

    fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Bookkeeping for a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnection {
    pub id: ClientId,
    pub connected_at: u64,
    pub last_seen_at: u64,
}

// ============================================================================
// WebSocket
// ============================================================================

/// WebSocket client, non-blocking after the handshake.
pub struct WsSink {
    ws: WebSocket<TcpStream>,
}

impl WsSink {
    pub fn new(ws: WebSocket<TcpStream>) -> Self {
        // Non-blocking for polling reads
        let _ = ws.get_ref().set_nonblocking(true);
        Self { ws }
    }
}

fn would_block(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Io(e) if e.kind() == ErrorKind::WouldBlock)
}

impl ClientSink for WsSink {
    fn send(&mut self, text: &str) -> Result<(), SinkError> {
        match self.ws.send(Message::Text(text.into())) {
            Ok(()) => Ok(()),
            // Frame is buffered and flushed on the next write
            Err(ref e) if would_block(e) => Ok(()),
            Err(e) => Err(SinkError(e.to_string())),
        }
    }

    fn poll(&mut self) -> SinkPoll {
        match self.ws.read() {
            Ok(Message::Close(_)) => SinkPoll::Closed,
            Ok(_) => SinkPoll::Active,
            Err(ref e) if would_block(e) => SinkPoll::Idle,
            Err(_) => SinkPoll::Closed,
        }
    }

    fn close(&mut self) {
        let _ = self.ws.close(None);
        let _ = self.ws.flush();
    }
}

// ============================================================================
// In-process
// ============================================================================

/// In-process subscriber receiving raw JSON frames.
pub struct ChannelSink {
    tx: crossbeam::channel::Sender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, crossbeam::channel::Receiver<String>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Self { tx }, rx)
    }
}

impl ClientSink for ChannelSink {
    fn send(&mut self, text: &str) -> Result<(), SinkError> {
        self.tx
            .send(text.to_string())
            .map_err(|_| SinkError("receiver dropped".into()))
    }
}
