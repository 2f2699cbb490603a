//! A [`Socket`] represents one client connected to one namespace.
//!
//! It owns the rooms joined by the client in this namespace, the outstanding ack callbacks of the
//! events it emitted and the handlers registered for the events it receives.
//!
//! A socket is created by its namespace once the middlewares passed and is connected after it joined
//! its private room (named after its [`Sid`]) and wrote the CONNECT packet. Once disconnected it is
//! removed from every structure that references it and is never reused.
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering},
    },
};

use serde::Serialize;
use socketbus_core::{
    Sid, Value,
    packet::{Packet, PacketData},
    transport::{CloseReason, Frame},
};
use tokio::sync::oneshot;

use crate::{
    ack::{AckFuture, AckSender, BoxedAckCallback},
    adapter::{Adapter, LocalAdapter, Room, RoomParam},
    client::{Client, Outgoing},
    errors::{AdapterError, SendError, SocketError},
    handler::{DisconnectHandler, ErrorHandler, ListenerId, Listeners, MessageHandler},
    ns::Namespace,
    operators::BroadcastOperators,
};

/// All the possible reasons for a [`Socket`] to be disconnected from a namespace.
///
/// It is handed to the [`on_disconnect`](Socket::on_disconnect) handlers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
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

    /// The server closed the whole connection with [`Socket::disconnect`] or [`Client::close`]
    ForcedServerClose,

    /// The client left the namespace with a DISCONNECT packet
    ClientNSDisconnect,

    /// The socket was disconnected from the namespace with [`Socket::disconnect`]
    ServerNSDisconnect,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DisconnectReason::*;
        let str: &'static str = match self {
            TransportClose => "transport close",
            TransportError => "transport error",
            HeartbeatTimeout => "ping timeout",
            PacketParsingError => "parse error",
            ClosingServer => "server shutting down",
            ForcedServerClose => "forced server close",
            ClientNSDisconnect => "client namespace disconnect",
            ServerNSDisconnect => "server namespace disconnect",
        };
        f.write_str(str)
    }
}

impl From<CloseReason> for DisconnectReason {
    fn from(reason: CloseReason) -> Self {
        use DisconnectReason::*;
        match reason {
            CloseReason::TransportClose => TransportClose,
            CloseReason::TransportError => TransportError,
            CloseReason::HeartbeatTimeout => HeartbeatTimeout,
            CloseReason::PacketParsingError => PacketParsingError,
            CloseReason::ClosingServer => ClosingServer,
            CloseReason::ForcedServerClose => ForcedServerClose,
        }
    }
}

const PENDING: u8 = 0;
const CONNECTED: u8 = 1;
const DISCONNECTED: u8 = 2;

const DISCONNECT_EVENT: &str = "disconnect";
const ERROR_EVENT: &str = "error";
const MESSAGE_EVENT: &str = "message";

/// Converts serializable data into a list of event arguments.
///
/// A serialized array is spread as positional arguments, `()` gives no argument and
/// any other value is a single argument.
pub(crate) fn into_args<T: ?Sized + Serialize>(data: &T) -> Result<Vec<Value>, serde_json::Error> {
    Ok(match serde_json::to_value(data)? {
        Value::Array(args) => args,
        Value::Null => Vec::new(),
        value => vec![value],
    })
}

/// A Socket represents a client connected to a namespace.
/// It is used to send and receive messages from the client, join and leave rooms, etc.
pub struct Socket<A: Adapter = LocalAdapter> {
    pub(crate) ns: Arc<Namespace<A>>,
    client: Arc<Client<A>>,
    state: AtomicU8,
    closing: AtomicBool,
    rooms: RwLock<Vec<Room>>,
    message_handlers: Listeners<MessageHandler<A>>,
    disconnect_handlers: Listeners<DisconnectHandler<A>>,
    error_handlers: Listeners<ErrorHandler<A>>,
    ack_message: Mutex<HashMap<i64, BoxedAckCallback>>,
    ack_counter: AtomicI64,
    /// The socket id
    pub id: Sid,
}

impl<A: Adapter> Socket<A> {
    pub(crate) fn new(ns: Arc<Namespace<A>>, client: Arc<Client<A>>) -> Self {
        Self {
            id: client.sid(),
            ns,
            client,
            state: AtomicU8::new(PENDING),
            closing: AtomicBool::new(false),
            rooms: RwLock::new(Vec::new()),
            message_handlers: Listeners::default(),
            disconnect_handlers: Listeners::default(),
            error_handlers: Listeners::default(),
            ack_message: Mutex::new(HashMap::new()),
            ack_counter: AtomicI64::new(0),
        }
    }

    // Handlers

    /// Registers a [`MessageHandler`] for the given event.
    ///
    /// Every handler registered for an event is called, in registration order, each time the
    /// client emits this event. The last argument is an [`AckSender`] if the client expects an
    /// acknowledgement.
    pub fn on<F>(&self, event: impl Into<Cow<'static, str>>, handler: F) -> ListenerId
    where
        F: Fn(Arc<Socket<A>>, Vec<Value>, Option<AckSender<A>>) + Send + Sync + 'static,
    {
        self.message_handlers.on(event, Arc::new(handler))
    }

    /// Registers a [`DisconnectHandler`] called once when the socket is disconnected.
    pub fn on_disconnect<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Arc<Socket<A>>, DisconnectReason) + Send + Sync + 'static,
    {
        self.disconnect_handlers.on(DISCONNECT_EVENT, Arc::new(handler))
    }

    /// Registers an [`ErrorHandler`] called with the payload of each ERROR packet sent by the client.
    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Arc<Socket<A>>, Value) + Send + Sync + 'static,
    {
        self.error_handlers.on(ERROR_EVENT, Arc::new(handler))
    }

    /// Removes the handler registered with `id` for the given event.
    /// `"disconnect"` and `"error"` target the handlers registered with [`Socket::on_disconnect`]
    /// and [`Socket::on_error`].
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        match event {
            DISCONNECT_EVENT => self.disconnect_handlers.off(event, id),
            ERROR_EVENT => self.error_handlers.off(event, id),
            _ => self.message_handlers.off(event, id),
        }
    }

    // Emitters

    /// Emits an event to this socket client.
    ///
    /// A serialized array is sent as positional arguments, `()` as no argument and any other
    /// value as a single argument.
    pub fn emit<T: ?Sized + Serialize>(
        &self,
        event: impl Into<String>,
        data: &T,
    ) -> Result<(), SendError> {
        let packet = Packet::event(self.ns.path.clone(), event, into_args(data)?);
        self.packet(Outgoing::Packet(packet), false)
    }

    /// Emits a `message` event to this socket client.
    pub fn send<T: ?Sized + Serialize>(&self, data: &T) -> Result<(), SendError> {
        self.emit(MESSAGE_EVENT, data)
    }

    /// Emits an event to this socket client and registers a callback for its acknowledgement.
    ///
    /// The callback is called at most once, with the data of the matching ACK packet.
    /// It is dropped without being called if the socket is disconnected first.
    pub fn emit_with_ack<T, F>(
        &self,
        event: impl Into<String>,
        data: &T,
        callback: F,
    ) -> Result<(), SendError>
    where
        T: ?Sized + Serialize,
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        let mut packet = Packet::event(self.ns.path.clone(), event, into_args(data)?);
        let ack_id = self.ack_counter.fetch_add(1, Ordering::SeqCst) + 1;
        packet.inner.set_ack_id(ack_id);

        self.ack_message
            .lock()
            .unwrap()
            .insert(ack_id, Box::new(callback));
        let res = self.packet(Outgoing::Packet(packet), false);
        if res.is_err() {
            self.ack_message.lock().unwrap().remove(&ack_id);
        }
        res
    }

    /// Emits an event to this socket client and returns an [`AckFuture`] of its acknowledgement.
    pub fn emit_with_ack_future<T: ?Sized + Serialize>(
        &self,
        event: impl Into<String>,
        data: &T,
    ) -> Result<AckFuture, SendError> {
        let (tx, rx) = oneshot::channel();
        self.emit_with_ack(event, data, move |data| {
            tx.send(data).ok();
        })?;
        Ok(AckFuture::new(rx, self.ns.ack_timeout))
    }

    /// Selects all the sockets in the given rooms except this one.
    ///
    /// The returned [`BroadcastOperators`] holds the targets for one emit only.
    pub fn to(self: &Arc<Self>, rooms: impl RoomParam) -> BroadcastOperators<A> {
        BroadcastOperators::from_sock(self.clone()).to(rooms)
    }

    /// Selects all the sockets of the namespace except this one.
    pub fn broadcast(self: &Arc<Self>) -> BroadcastOperators<A> {
        BroadcastOperators::from_sock(self.clone()).broadcast()
    }

    /// Flags the next emit as volatile: it is dropped for any client that cannot accept it right now.
    pub fn volatile(self: &Arc<Self>) -> BroadcastOperators<A> {
        BroadcastOperators::from_sock(self.clone()).volatile()
    }

    /// Writes a packet to this socket client.
    /// Unencoded packets are stamped with this socket namespace.
    pub fn packet(&self, packet: Outgoing, volatile: bool) -> Result<(), SendError> {
        let packet = match packet {
            Outgoing::Packet(mut packet) => {
                packet.ns = self.ns.path.clone();
                Outgoing::Packet(packet)
            }
            encoded => encoded,
        };
        self.client.packet(packet, volatile)
    }

    /// Writes already encoded frames to this socket client.
    pub(crate) fn write_frames(&self, frames: Vec<Frame>, volatile: bool) -> Result<(), SocketError> {
        self.client.write(frames, volatile)
    }

    /// Emits an ERROR packet with the given payload. It does not change the socket state.
    pub fn error<T: ?Sized + Serialize>(&self, data: &T) -> Result<(), SendError> {
        let packet = Packet::error(self.ns.path.clone(), serde_json::to_value(data)?);
        self.packet(Outgoing::Packet(packet), false)
    }

    // Rooms

    /// Joins the given room.
    ///
    /// The room is only recorded once the adapter completed the join.
    /// If the adapter fails, the error is returned and the room is not recorded.
    /// Joining a room the socket is already in is a no-op.
    pub async fn join(&self, room: impl Into<Room>) -> Result<(), AdapterError> {
        let room = room.into();
        if self.rooms.read().unwrap().contains(&room) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.id, ?room, "joining room");
        if let Err(e) = self.ns.adapter.add(self.id, room.clone()).await {
            return Err(e.into());
        }

        let mut rooms = self.rooms.write().unwrap();
        if !rooms.contains(&room) {
            rooms.push(room);
        }
        Ok(())
    }

    /// Leaves the given room.
    ///
    /// The room is only forgotten once the adapter completed the removal.
    /// Leaving a room the socket is not in is a no-op.
    pub async fn leave(&self, room: impl Into<Room>) -> Result<(), AdapterError> {
        let room = room.into();
        if !self.rooms.read().unwrap().contains(&room) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.id, ?room, "leaving room");
        if let Err(e) = self.ns.adapter.remove(self.id, room.clone()).await {
            return Err(e.into());
        }

        self.rooms.write().unwrap().retain(|r| r != &room);
        Ok(())
    }

    /// Leaves all the rooms, including the private one.
    pub fn leave_all(&self) {
        if let Err(_e) = self.ns.adapter.remove_all(self.id) {
            #[cfg(feature = "tracing")]
            tracing::warn!(sid = ?self.id, "adapter error while leaving all rooms: {}", _e);
        }
        self.rooms.write().unwrap().clear();
    }

    /// Returns the rooms this socket is in, in join order.
    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.read().unwrap().clone()
    }

    // State

    /// Returns true if the socket is connected to its namespace.
    pub fn connected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CONNECTED
    }

    /// Returns true if the socket was disconnected. A disconnected socket is never reused.
    pub fn disconnected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == DISCONNECTED
    }

    /// Returns the namespace of this socket.
    pub fn ns(&self) -> &Arc<Namespace<A>> {
        &self.ns
    }

    /// Returns the client of this socket.
    pub fn client(&self) -> &Arc<Client<A>> {
        &self.client
    }

    /// Disconnects this socket.
    ///
    /// * With `close` set, the whole transport connection is closed. Every socket of the client
    ///   is then disconnected, in every namespace.
    /// * Otherwise a DISCONNECT packet is sent for this namespace only and the socket is closed
    ///   with [`DisconnectReason::ServerNSDisconnect`].
    ///
    /// Disconnecting an already disconnected socket is a no-op.
    pub fn disconnect(self: &Arc<Self>, close: bool) {
        if self.disconnected() {
            return;
        }
        if close {
            self.client.close();
            return;
        }
        let packet = Packet::disconnect(self.ns.path.clone());
        if let Err(_e) = self.packet(Outgoing::Packet(packet), false) {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?self.id, "error sending disconnect packet: {}", _e);
        }
        self.on_close(DisconnectReason::ServerNSDisconnect);
    }

    // Protocol

    /// Joins the private room, writes the CONNECT packet and registers the socket as connected.
    /// It completes before any user listener is notified of the socket.
    pub(crate) async fn on_connect(self: &Arc<Self>) -> Result<(), AdapterError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.id, ns = ?self.ns.path, "socket connected, writing connect packet");

        self.join(self.id.to_string()).await?;
        let packet = Packet::connect(self.ns.path.clone());
        if let Err(_e) = self.packet(Outgoing::Packet(packet), false) {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?self.id, "error sending connect packet: {}", _e);
        }
        self.ns.insert_connected(self, || {
            self.state.store(CONNECTED, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Dispatches a packet received from the client.
    pub(crate) fn on_packet(self: &Arc<Self>, packet: PacketData) {
        match packet {
            PacketData::Event(data, ack_id) | PacketData::BinaryEvent(data, ack_id) => {
                self.on_event(data, ack_id)
            }
            PacketData::EventAck(data, ack_id) => self.on_ack(ack_id, data),
            PacketData::Disconnect => self.on_disconnect_packet(),
            PacketData::Error(data) => self.on_error_packet(data),
            PacketData::Connect => {
                #[cfg(feature = "tracing")]
                tracing::debug!(sid = ?self.id, "unexpected connect packet for a connected socket");
            }
        }
    }

    fn on_event(self: &Arc<Self>, data: Vec<Value>, ack_id: Option<i64>) {
        let mut data = data.into_iter();
        let event = match data.next() {
            Some(Value::String(event)) => event,
            _event => {
                #[cfg(feature = "tracing")]
                tracing::debug!(sid = ?self.id, "invalid event name: {:?}", _event);
                return;
            }
        };
        let args: Vec<Value> = data.collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.id, ?ack_id, "emitting event {event}");

        let ack = ack_id.map(|id| self.ack(id));
        for handler in self.message_handlers.get(&event) {
            handler(self.clone(), args.clone(), ack.clone());
        }
    }

    /// Builds the [`AckSender`] for an event received with the given ack id.
    pub fn ack(self: &Arc<Self>, ack_id: i64) -> AckSender<A> {
        AckSender::new(self.clone(), ack_id)
    }

    /// Consumes the callback registered for `ack_id`, if any.
    /// A panicking callback is logged and does not affect the socket.
    fn on_ack(&self, ack_id: i64, data: Vec<Value>) {
        let callback = self.ack_message.lock().unwrap().remove(&ack_id);
        let Some(callback) = callback else {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?self.id, ack_id, "no callback registered for ack, dropping");
            return;
        };

        if let Err(_e) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(data))) {
            #[cfg(feature = "tracing")]
            tracing::error!(sid = ?self.id, ack_id, "ack callback panicked");
        }
    }

    fn on_disconnect_packet(self: &Arc<Self>) {
        self.on_close(DisconnectReason::ClientNSDisconnect);
    }

    fn on_error_packet(self: &Arc<Self>, data: Value) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.id, "error packet received: {:?}", data);
        for handler in self.error_handlers.get(ERROR_EVENT) {
            handler(self.clone(), data.clone());
        }
    }

    /// Tears the socket down.
    ///
    /// Rooms and tracking structures are cleaned before the disconnect handlers are called.
    /// Only the first call on a connected socket has an effect.
    pub(crate) fn on_close(self: &Arc<Self>, reason: DisconnectReason) {
        if !self.connected() || self.closing.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "tracing")]
            tracing::trace!(sid = ?self.id, "socket already closed");
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.id, ns = ?self.ns.path, ?reason, "closing socket");

        self.leave_all();
        self.ns.remove(self);
        self.client.remove(self);
        self.ns.remove_connected(self, || {
            self.state.store(DISCONNECTED, Ordering::SeqCst);
        });
        // Outstanding callbacks are abandoned.
        self.ack_message.lock().unwrap().clear();

        for handler in self.disconnect_handlers.get(DISCONNECT_EVENT) {
            handler(self.clone(), reason);
        }
    }
}

impl<A: Adapter> fmt::Debug for Socket<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("ns", &self.ns.path)
            .field("id", &self.id)
            .field("connected", &self.connected())
            .field("disconnected", &self.disconnected())
            .field("rooms", &self.rooms)
            .field("ack_counter", &self.ack_counter)
            .finish()
    }
}
impl<A: Adapter> PartialEq for Socket<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.ns.path == other.ns.path
    }
}

#[cfg(test)]
impl Socket<LocalAdapter> {
    /// Creates a socket bound to a dummy client and connects it to the namespace.
    /// The receiver yields every frame written to the client.
    pub(crate) async fn new_dummy(
        ns: Arc<Namespace<LocalAdapter>>,
    ) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<Frame>) {
        let (client, rx) = Client::new_dummy();
        let socket = Arc::new(Socket::new(ns.clone(), client.clone()));
        ns.track(&socket);
        socket.on_connect().await.unwrap();
        client.register(&socket);
        (socket, rx)
    }
}
