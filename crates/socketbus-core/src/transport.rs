//! The transport boundary.
//!
//! A transport is an opaque duplex channel. The session layer only needs to read its state,
//! write [`Frame`]s to it and close it. In the other direction the transport notifies a
//! [`TransportHandler`] of new connections, incoming frames and closures.
use std::{fmt, sync::Arc};

use bytes::Bytes;

use crate::{errors::SocketError, sid::Sid};

/// A unit of data written to or read from a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame
    Text(String),
    /// A binary frame
    Binary(Bytes),
}

impl Frame {
    /// Returns the frame as a string slice if it is a text frame
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Text(s) => Some(s),
            Frame::Binary(_) => None,
        }
    }

    /// Returns the length of the frame payload in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    /// Returns true if the frame payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Frame {
    fn from(value: String) -> Self {
        Frame::Text(value)
    }
}
impl From<&'static str> for Frame {
    fn from(value: &'static str) -> Self {
        Frame::Text(value.to_owned())
    }
}
impl From<Bytes> for Frame {
    fn from(value: Bytes) -> Self {
        Frame::Binary(value)
    }
}

/// The state of a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// The handshake is not finished yet
    Opening,
    /// Frames can be written
    Open,
    /// A close was requested and is in progress
    Closing,
    /// The connection is closed
    Closed,
}

/// All the possible reasons for a transport connection to be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The client gracefully closed the connection
    TransportClose,
    /// The connection was abruptly closed
    TransportError,
    /// The client did not answer the heartbeat in time
    HeartbeatTimeout,
    /// The client sent data that could not be decoded
    PacketParsingError,
    /// The server is being closed
    ClosingServer,
    /// The server closed the connection on purpose
    ForcedServerClose,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CloseReason::*;
        let str: &'static str = match self {
            TransportClose => "transport close",
            TransportError => "transport error",
            HeartbeatTimeout => "ping timeout",
            PacketParsingError => "parse error",
            ClosingServer => "server shutting down",
            ForcedServerClose => "forced server close",
        };
        f.write_str(str)
    }
}

/// A handle to one physical transport connection.
///
/// Implementations must be cheap to call from any thread; writes are expected to be
/// buffered by the transport and must not block.
pub trait Connection: Send + Sync + 'static {
    /// The session id of this connection
    fn sid(&self) -> Sid;

    /// The current state of the connection
    fn ready_state(&self) -> ReadyState;

    /// Whether the connection can accept a write right now without queueing.
    /// Volatile packets are dropped when this returns `false`.
    fn is_writable(&self) -> bool;

    /// Write one frame to the connection
    fn write(&self, frame: Frame) -> Result<(), SocketError>;

    /// Close the connection. The transport must then call [`TransportHandler::on_close`]
    /// once the connection is effectively closed.
    fn close(&self, reason: CloseReason);
}

/// The handler a transport notifies about its connections.
pub trait TransportHandler: Send + Sync + 'static {
    /// Called when a new connection is open
    fn on_connect(self: Arc<Self>, conn: Arc<dyn Connection>);

    /// Called for each frame received on a connection
    fn on_data(&self, sid: Sid, frame: Frame) -> Result<(), SocketError>;

    /// Called when a connection is closed, whatever the reason
    fn on_close(&self, sid: Sid, reason: CloseReason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len() {
        assert_eq!(Frame::from("hello").len(), 5);
        assert!(Frame::from(Bytes::new()).is_empty());
        assert_eq!(Frame::from("x").as_str(), Some("x"));
        assert_eq!(Frame::Binary(Bytes::from_static(b"x")).as_str(), None);
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(CloseReason::TransportClose.to_string(), "transport close");
        assert_eq!(CloseReason::HeartbeatTimeout.to_string(), "ping timeout");
    }
}
