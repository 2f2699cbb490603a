//! Operators are used to select the sockets a packet is sent to.
//!
//! A [`BroadcastOperators`] is built by [`Socket::to`], [`Socket::broadcast`], [`Socket::volatile`]
//! or their [`Namespace`] counterparts, and consumed by the emit that follows. The selected
//! targets are therefore never shared between two emits.
use std::sync::Arc;

use serde::Serialize;
use socketbus_core::{Sid, packet::Packet};

use crate::{
    adapter::{Adapter, BroadcastFlags, BroadcastOptions, LocalAdapter, RoomParam},
    client::Outgoing,
    errors::{AdapterError, EmitError, SendError},
    ns::Namespace,
    socket::{Socket, into_args},
};

/// Chainable operators to select sockets and configure the next emitted packet.
#[must_use = "operators do nothing unless an emit method is called"]
pub struct BroadcastOperators<A: Adapter = LocalAdapter> {
    ns: Arc<Namespace<A>>,
    socket: Option<Arc<Socket<A>>>,
    opts: BroadcastOptions,
}

impl<A: Adapter> BroadcastOperators<A> {
    pub(crate) fn from_ns(ns: Arc<Namespace<A>>) -> Self {
        Self {
            ns,
            socket: None,
            opts: BroadcastOptions::default(),
        }
    }

    pub(crate) fn from_sock(socket: Arc<Socket<A>>) -> Self {
        Self {
            ns: socket.ns.clone(),
            opts: BroadcastOptions::except_sender(socket.id),
            socket: Some(socket),
        }
    }

    /// Selects all the sockets in the given rooms. Rooms already selected are ignored.
    ///
    /// When built from a socket, the socket itself is always excluded.
    /// ```rust,no_run
    /// # use socketbus::Engine;
    /// let engine = Engine::new();
    /// engine.on_connection(|socket| {
    ///     socket.on("chat", |socket, args, _| {
    ///         socket.to("room1").to(["room2", "room3"]).emit("chat", &args).ok();
    ///     });
    /// });
    /// ```
    pub fn to(mut self, rooms: impl RoomParam) -> Self {
        self.opts.rooms.extend(rooms.into_room_iter());
        self
    }

    /// Selects all the sockets of the namespace.
    /// When built from a socket, the socket itself is excluded.
    pub fn broadcast(mut self) -> Self {
        self.opts.add_flag(BroadcastFlags::Broadcast);
        self
    }

    /// The packet is dropped for every client that cannot accept it right now.
    pub fn volatile(mut self) -> Self {
        self.opts.add_flag(BroadcastFlags::Volatile);
        self
    }

    /// Emits an event to the selected sockets.
    ///
    /// When built from a socket with no room selected and without the broadcast flag, the packet
    /// is only written to the socket itself. Otherwise it is broadcast through the adapter.
    ///
    /// If some sockets cannot be reached, the packet is still sent to the other ones and
    /// a [`BroadcastError::Socket`](crate::BroadcastError::Socket) is returned.
    pub fn emit<T: ?Sized + Serialize>(
        self,
        event: impl Into<String>,
        data: &T,
    ) -> Result<(), EmitError> {
        let args = into_args(data).map_err(SendError::from)?;
        let packet = Packet::event(self.ns.path.clone(), event, args);
        let volatile = self.opts.has_flag(BroadcastFlags::Volatile);

        match self.socket {
            Some(socket)
                if self.opts.rooms.is_empty() && !self.opts.has_flag(BroadcastFlags::Broadcast) =>
            {
                socket.packet(Outgoing::Packet(packet), volatile)?;
            }
            _ => {
                if let Err(e) = self.ns.adapter.broadcast(packet, self.opts) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(ns = ?self.ns.path, "broadcast error: {e:?}");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Emits a `message` event to the selected sockets.
    pub fn send<T: ?Sized + Serialize>(self, data: &T) -> Result<(), EmitError> {
        self.emit("message", data)
    }

    /// Returns the ids of the selected sockets.
    pub fn sockets(self) -> Result<Vec<Sid>, AdapterError> {
        self.ns.adapter.sockets(self.opts).map_err(Into::into)
    }
}

impl<A: Adapter> std::fmt::Debug for BroadcastOperators<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastOperators")
            .field("ns", &self.ns.path)
            .field("socket", &self.socket.as_ref().map(|s| s.id))
            .field("opts", &self.opts)
            .finish()
    }
}
