use std::{sync::Arc, time::Duration};

use socketbus_core::parser::Parse;
use socketbus_parser_json::JsonParser;

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The maximum number of inbound frames queued per connection before
    /// [`TransportHandler::on_data`](socketbus_core::transport::TransportHandler::on_data)
    /// starts returning [`SocketError::InternalChannelFull`](crate::SocketError::InternalChannelFull).
    ///
    /// Defaults to 128 frames.
    pub max_buffer_size: usize,

    /// The amount of time an [`AckFuture`](crate::ack::AckFuture) waits for an acknowledgement.
    ///
    /// Defaults to 5 seconds.
    pub ack_timeout: Duration,

    /// The parser used to encode and decode packets.
    ///
    /// Defaults to the [`JsonParser`].
    pub parser: Arc<dyn Parse>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 128,
            ack_timeout: Duration::from_secs(5),
            parser: Arc::new(JsonParser),
        }
    }
}
