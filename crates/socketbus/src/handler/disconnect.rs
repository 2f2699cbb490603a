//! Functions and types used to observe the end of a socket.
//!
//! A disconnect handler is called exactly once per socket, after the socket left its rooms
//! and was removed from its namespace and client.
//! An error handler is called with the payload of every ERROR packet sent by the client.
use std::sync::Arc;

use socketbus_core::Value;

use crate::socket::{DisconnectReason, Socket};

/// A function called when a socket is disconnected.
pub type DisconnectHandler<A> = dyn Fn(Arc<Socket<A>>, DisconnectReason) + Send + Sync + 'static;

/// A function called when the client reports an error.
pub type ErrorHandler<A> = dyn Fn(Arc<Socket<A>>, Value) + Send + Sync + 'static;
