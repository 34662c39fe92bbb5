//! Sockets and Frames
//!
//! A socket is the hub's handle on one live transport connection: an id
//! plus a channel the transport drains into the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::hub::HubError;

/// Unique identifier for a transport connection
pub type SocketId = String;

/// Inbound channel (client to hub)
pub const SERVER_CHANNEL: &str = "server";
/// Outbound channel (hub to client)
pub const CLIENT_CHANNEL: &str = "client";

/// One message on a named channel. On the wire: `[channel, payload]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, Value)", into = "(String, Value)")]
pub struct Frame {
    pub channel: String,
    pub payload: Value,
}

impl Frame {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    /// Reply frame on the `client` channel
    pub fn client(payload: Value) -> Self {
        Self::new(CLIENT_CHANNEL, payload)
    }
}

impl From<(String, Value)> for Frame {
    fn from((channel, payload): (String, Value)) -> Self {
        Self { channel, payload }
    }
}

impl From<Frame> for (String, Value) {
    fn from(frame: Frame) -> Self {
        (frame.channel, frame.payload)
    }
}

/// Handle for emitting to one connection
#[derive(Clone)]
pub struct Socket {
    id: SocketId,
    sender: mpsc::UnboundedSender<Frame>,
}

impl Socket {
    /// Wrap a transport channel under a fresh id
    pub fn new(sender: mpsc::UnboundedSender<Frame>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), sender)
    }

    pub fn with_id(id: impl Into<SocketId>, sender: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            id: id.into(),
            sender,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue `payload` on `channel` for this connection
    pub fn emit(&self, channel: &str, payload: Value) -> Result<(), HubError> {
        self.sender
            .send(Frame::new(channel, payload))
            .map_err(|_| HubError::SendFailed(self.id.clone()))
    }

    /// True once the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for Socket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Socket {}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Socket").field(&self.id).finish()
    }
}

/// The `_conn` record handed to handlers: the socket the event arrived on
/// and every socket of its session at dispatch time.
#[derive(Debug, Clone)]
pub struct Conn {
    socket: Socket,
    sockets: Vec<Socket>,
}

impl Conn {
    pub fn new(socket: Socket, sockets: Vec<Socket>) -> Self {
        Self { socket, sockets }
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    /// Emit to every socket of the session, returning how many accepted it
    pub fn emit_all(&self, channel: &str, payload: &Value) -> usize {
        self.sockets
            .iter()
            .filter(|s| s.emit(channel, payload.clone()).is_ok())
            .count()
    }
}
