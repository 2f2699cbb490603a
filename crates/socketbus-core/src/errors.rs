//! Errors shared by the socketbus crates. Mostly returned at the [adapter](crate::adapter)
//! and [transport](crate::transport) boundaries.
use std::{convert::Infallible, fmt};

/// Error type when writing to the underlying transport connection.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// The client inbound channel is full.
    /// You might need to increase the channel size with the `EngineBuilder::max_buffer_size` method.
    #[error("internal channel full error")]
    InternalChannelFull,

    /// The connection is already closed
    #[error("socket closed")]
    Closed,
}

/// Error type for the [`CoreAdapter`](crate::adapter::CoreAdapter) trait.
#[derive(Debug, thiserror::Error)]
pub struct AdapterError(#[from] pub Box<dyn std::error::Error + Send + Sync>);
impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
impl From<Infallible> for AdapterError {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

/// Errors when encoding or decoding packets.
#[derive(thiserror::Error, Debug)]
pub enum ParserError {
    /// Received a frame kind the parser cannot handle
    #[error("received unexpected binary data. Make sure you are using the same parser on both ends.")]
    UnexpectedBinaryPacket,

    /// Serde error
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Error type for broadcast operations.
#[derive(thiserror::Error, Debug)]
pub enum BroadcastError {
    /// Some sockets could not be reached.
    /// The other sockets still received the packet.
    #[error("error sending data through the sockets: {0:?}")]
    Socket(Vec<SocketError>),

    /// The packet could not be encoded
    #[error("error encoding the packet: {0}")]
    Encode(#[from] ParserError),

    /// An error occurred in the adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

impl From<Vec<SocketError>> for BroadcastError {
    fn from(value: Vec<SocketError>) -> Self {
        Self::Socket(value)
    }
}
