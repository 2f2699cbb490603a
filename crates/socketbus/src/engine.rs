use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
    time::Duration,
};

use serde::Serialize;
use socketbus_core::{
    DEFAULT_NS, Sid, Str,
    parser::Parse,
    transport::{CloseReason, Connection, Frame, TransportHandler},
};

use crate::{
    EngineConfig,
    adapter::{Adapter, LocalAdapter, RoomParam},
    client::{Client, Inbound},
    errors::{EmitError, SocketError},
    handler::ListenerId,
    ns::Namespace,
    operators::BroadcastOperators,
    socket::Socket,
};

/// A builder to create an [`Engine`].
/// It contains everything to configure the engine with an [`EngineConfig`].
pub struct EngineBuilder<A: Adapter = LocalAdapter> {
    config: EngineConfig,
    adapter_state: A::State,
}

impl EngineBuilder<LocalAdapter> {
    /// Creates a new [`EngineBuilder`] with default config
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            adapter_state: (),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Adapter> EngineBuilder<A> {
    /// The maximum number of inbound frames queued per connection.
    /// Once the queue is full, [`TransportHandler::on_data`] returns
    /// [`SocketError::InternalChannelFull`].
    ///
    /// Defaults to 128 frames.
    #[inline]
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// The amount of time an [`AckFuture`](crate::ack::AckFuture) waits for the acknowledgement.
    ///
    /// Defaults to 5 seconds.
    #[inline]
    pub fn ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.config.ack_timeout = ack_timeout;
        self
    }

    /// Sets a custom [`EngineConfig`] for this [`EngineBuilder`]
    #[inline]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the parser used to encode and decode packets. Both ends must use the same one.
    #[inline]
    pub fn with_parser(mut self, parser: impl Parse) -> Self {
        self.config.parser = Arc::new(parser);
        self
    }

    /// Sets a custom [`Adapter`] for this [`EngineBuilder`]
    pub fn with_adapter<B: Adapter>(self, adapter_state: B::State) -> EngineBuilder<B> {
        EngineBuilder {
            config: self.config,
            adapter_state,
        }
    }

    /// Builds the [`Engine`]. The default namespace is created right away.
    pub fn build(self) -> Arc<Engine<A>> {
        let engine = Engine {
            config: self.config,
            nsps: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            adapter_state: self.adapter_state,
        };
        engine.of(DEFAULT_NS);
        Arc::new(engine)
    }
}

/// The engine is the registry of the namespaces and of the connected clients.
///
/// It is handed to the transport as a [`TransportHandler`]: the transport notifies it of
/// every opened connection, every received frame and every closed connection.
pub struct Engine<A: Adapter = LocalAdapter> {
    pub(crate) config: EngineConfig,
    nsps: RwLock<HashMap<Str, Arc<Namespace<A>>>>,
    clients: RwLock<HashMap<Sid, Arc<Client<A>>>>,
    adapter_state: A::State,
}

impl Engine<LocalAdapter> {
    /// Creates a new [`Engine`] with the default config and the [`LocalAdapter`].
    pub fn new() -> Arc<Self> {
        EngineBuilder::new().build()
    }

    /// Creates a new [`EngineBuilder`] to configure the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }
}

impl<A: Adapter> Engine<A> {
    /// Returns the current config.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the namespace with the given path, creating it if it does not exist yet.
    pub fn of(&self, path: impl Into<Str>) -> Arc<Namespace<A>> {
        let path = path.into();
        if let Some(ns) = self.nsps.read().unwrap().get(&path) {
            return ns.clone();
        }

        let mut nsps = self.nsps.write().unwrap();
        nsps.entry(path.clone())
            .or_insert_with(|| {
                #[cfg(feature = "tracing")]
                tracing::debug!(ns = ?path, "creating namespace");
                Namespace::new(path, &self.config, &self.adapter_state)
            })
            .clone()
    }

    /// Returns the default namespace.
    pub fn sockets(&self) -> Arc<Namespace<A>> {
        self.of(DEFAULT_NS)
    }

    /// Registers a handler called with every socket connected to the default namespace.
    pub fn on_connection<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Arc<Socket<A>>) + Send + Sync + 'static,
    {
        self.sockets().on_connection(handler)
    }

    /// Emits an event to every socket of the default namespace.
    pub fn emit<T: ?Sized + Serialize>(
        &self,
        event: impl Into<String>,
        data: &T,
    ) -> Result<(), EmitError> {
        self.sockets().emit(event, data)
    }

    /// Selects the sockets of the given rooms in the default namespace.
    pub fn to(&self, rooms: impl RoomParam) -> BroadcastOperators<A> {
        self.sockets().to(rooms)
    }

    /// Flags the next emit to the default namespace as volatile.
    pub fn volatile(&self) -> BroadcastOperators<A> {
        self.sockets().volatile()
    }

    /// Returns the client bound to the connection with the given session id.
    pub fn get_client(&self, sid: Sid) -> Option<Arc<Client<A>>> {
        self.clients.read().unwrap().get(&sid).cloned()
    }

    /// Returns the number of connected clients.
    pub fn clients_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Closes every client connection with [`CloseReason::ClosingServer`].
    /// The sockets are torn down as the transport reports each close.
    pub fn close(&self) {
        let clients: Vec<_> = self.clients.read().unwrap().values().cloned().collect();

        #[cfg(feature = "tracing")]
        tracing::debug!("closing {} clients", clients.len());

        for client in clients {
            client.close_with(CloseReason::ClosingServer);
        }
    }

    pub(crate) fn remove_client(&self, sid: Sid) {
        self.clients.write().unwrap().remove(&sid);
    }
}

impl<A: Adapter> TransportHandler for Engine<A> {
    fn on_connect(self: Arc<Self>, conn: Arc<dyn Connection>) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?conn.sid(), "new connection");

        let (client, rx) = Client::new(self.clone(), conn);
        self.clients
            .write()
            .unwrap()
            .insert(client.sid(), client.clone());
        tokio::spawn(client.run(rx));
    }

    fn on_data(&self, sid: Sid, frame: Frame) -> Result<(), SocketError> {
        let client = self.get_client(sid).ok_or(SocketError::Closed)?;
        client.push(Inbound::Data(frame))
    }

    fn on_close(&self, sid: Sid, reason: CloseReason) {
        let Some(client) = self.get_client(sid) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(?sid, "close for unknown client");
            return;
        };
        match client.push(Inbound::Close(reason)) {
            Ok(()) => {}
            Err(SocketError::InternalChannelFull) => {
                tokio::spawn(async move {
                    if client.push_wait(Inbound::Close(reason)).await.is_err() {
                        client.on_close(reason);
                    }
                });
            }
            Err(SocketError::Closed) => client.on_close(reason),
        }
    }
}

impl<A: Adapter> fmt::Debug for Engine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("nsps", &self.nsps.read().unwrap().keys().collect::<Vec<_>>())
            .field("clients", &self.clients_count())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use socketbus_core::packet::Packet;

    use super::*;
    use crate::client::test::DummyConn;

    #[test]
    fn of_creates_once() {
        let engine = Engine::new();
        let ns = engine.of("/chat");
        assert!(Arc::ptr_eq(&ns, &engine.of("/chat")));
        assert!(Arc::ptr_eq(&engine.sockets(), &engine.of("/")));
        assert_eq!(engine.nsps.read().unwrap().len(), 2);
    }

    #[test]
    fn builder_config() {
        let engine = Engine::builder()
            .max_buffer_size(4)
            .ack_timeout(Duration::from_millis(10))
            .build();
        assert_eq!(engine.config().max_buffer_size, 4);
        assert_eq!(engine.config().ack_timeout, Duration::from_millis(10));
        let frames = engine.config().parser.encode(&Packet::connect("/")).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn data_for_unknown_client() {
        let engine = Engine::new();
        let res = engine.on_data(Sid::new(), Frame::from("{}"));
        assert_eq!(res, Err(SocketError::Closed));
    }

    #[tokio::test]
    async fn full_inbound_queue() {
        let engine = Engine::builder().max_buffer_size(1).build();
        let (conn, _rx) = DummyConn::new();
        let sid = conn.sid();
        engine.clone().on_connect(conn);
        assert_eq!(engine.clients_count(), 1);

        // The client task has not run yet on this single threaded runtime.
        assert_eq!(engine.on_data(sid, Frame::from("{}")), Ok(()));
        assert_eq!(
            engine.on_data(sid, Frame::from("{}")),
            Err(SocketError::InternalChannelFull)
        );
    }
}
