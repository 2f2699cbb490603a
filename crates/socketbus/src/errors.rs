pub use socketbus_core::errors::{AdapterError, BroadcastError, ParserError, SocketError};

/// Error type for sending operations on a single socket.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// The data could not be serialized
    #[error("error serializing data: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The packet could not be encoded by the parser
    #[error("error encoding packet: {0}")]
    Encode(#[from] ParserError),

    /// The frames could not be written to the connection
    #[error("error sending data through the connection: {0}")]
    Socket(#[from] SocketError),
}

/// Error type returned by [`BroadcastOperators::emit`](crate::operators::BroadcastOperators::emit).
#[derive(thiserror::Error, Debug)]
pub enum EmitError {
    /// The packet was targeted at the sender only and could not be sent
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// The adapter failed to broadcast the packet
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
}

/// Error type for the [`AckFuture`](crate::ack::AckFuture).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    /// The client did not acknowledge the event before the `ack_timeout`
    #[error("ack timeout error")]
    Timeout,

    /// The socket was disconnected before the acknowledgement was received
    #[error("socket closed before the ack was received")]
    Closed,
}
