//! Functions and types used to handle incoming events.
//!
//! A message handler is called with the socket, the event arguments and an optional
//! [`AckSender`]. The ack sender is only present when the client expects an acknowledgement
//! for this event.
//!
//! ```rust,no_run
//! # use socketbus::Engine;
//! let engine = Engine::new();
//! engine.on_connection(|socket| {
//!     socket.on("echo", |socket, args, ack| {
//!         match ack {
//!             Some(ack) => ack.send(&args).ok(),
//!             None => socket.emit("echo", &args).ok(),
//!         };
//!     });
//! });
//! ```
use std::sync::Arc;

use socketbus_core::Value;

use crate::{ack::AckSender, socket::Socket};

/// A function called with every occurrence of an event on a socket.
pub type MessageHandler<A> =
    dyn Fn(Arc<Socket<A>>, Vec<Value>, Option<AckSender<A>>) + Send + Sync + 'static;
