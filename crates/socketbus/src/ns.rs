//! A [`Namespace`] is an independent event channel multiplexed over the client connections.
//!
//! Each namespace owns its adapter, its middlewares and its `connect`/`connection` listeners.
//! A client joins a namespace by sending a CONNECT packet for its path.
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, RwLock, Weak},
    time::Duration,
};

use serde::Serialize;
use socketbus_core::{
    Sid, Str,
    adapter::{CoreLocalAdapter, SocketEmitter},
    parser::Parse,
    transport::Frame,
};

use crate::{
    EngineConfig,
    adapter::{Adapter, Room, RoomParam},
    client::Client,
    errors::{AdapterError, EmitError, SocketError},
    handler::{ConnectMiddleware, ConnectionHandler, ListenerId, Listeners, MiddlewareError},
    operators::BroadcastOperators,
    socket::Socket,
};

const CONNECT_EVENT: &str = "connect";
const CONNECTION_EVENT: &str = "connection";
const MESSAGE_EVENT: &str = "message";

/// A namespace groups the sockets of the clients connected to the same path.
pub struct Namespace<A: Adapter> {
    /// The namespace path, `/` for the default namespace
    pub path: Str,
    pub(crate) adapter: A,
    pub(crate) ack_timeout: Duration,
    middlewares: RwLock<Vec<Arc<dyn ConnectMiddleware<A>>>>,
    listeners: Listeners<ConnectionHandler<A>>,
    /// Sockets admitted in the namespace
    sockets: RwLock<HashMap<Sid, Arc<Socket<A>>>>,
    /// Sockets for which [`Socket::connected`] is true
    connected: RwLock<HashMap<Sid, Arc<Socket<A>>>>,
}

impl<A: Adapter> Namespace<A> {
    pub(crate) fn new(path: Str, config: &EngineConfig, adapter_state: &A::State) -> Arc<Self> {
        let parser = config.parser.clone();
        Arc::new_cyclic(|ns| Self {
            adapter: A::new(
                adapter_state,
                CoreLocalAdapter::new(Emitter::new(ns.clone(), parser, path.clone())),
            ),
            path,
            ack_timeout: config.ack_timeout,
            middlewares: RwLock::new(Vec::new()),
            listeners: Listeners::default(),
            sockets: RwLock::new(HashMap::new()),
            connected: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a middleware called before any socket is connected to this namespace.
    ///
    /// Middlewares are called in registration order. The first one returning an error stops the
    /// chain: the client receives an ERROR packet with the error message and the socket is
    /// discarded.
    ///
    /// ```rust,no_run
    /// # use socketbus::Engine;
    /// let engine = Engine::new();
    /// engine.of("/admin").middleware(|socket| async move {
    ///     if socket.id.as_str().starts_with('A') {
    ///         Err("forbidden")
    ///     } else {
    ///         Ok(())
    ///     }
    /// });
    /// ```
    pub fn middleware<F, Fut, E>(&self, middleware: F)
    where
        F: Fn(Arc<Socket<A>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let middleware: Arc<dyn ConnectMiddleware<A>> = Arc::new(middleware);
        self.middlewares.write().unwrap().push(middleware);
    }

    /// Registers a handler called with every socket connected to this namespace.
    ///
    /// The socket has already joined its private room and received the CONNECT packet.
    pub fn on_connection<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Arc<Socket<A>>) + Send + Sync + 'static,
    {
        self.listeners.on(CONNECTION_EVENT, Arc::new(handler))
    }

    /// Registers a `connect` handler. `connect` handlers are called before the `connection` ones.
    pub fn on_connect<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Arc<Socket<A>>) + Send + Sync + 'static,
    {
        self.listeners.on(CONNECT_EVENT, Arc::new(handler))
    }

    /// Removes the `connect` or `connection` handler registered with `id`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.listeners.off(event, id)
    }

    /// Runs the middlewares against a candidate socket.
    pub(crate) async fn run(&self, socket: &Arc<Socket<A>>) -> Result<(), MiddlewareError> {
        let middlewares = self.middlewares.read().unwrap().clone();
        for middleware in middlewares {
            middleware.call(socket.clone()).await?;
        }
        Ok(())
    }

    /// Admits a client in the namespace.
    ///
    /// The socket is connected before `on_connected` and the user listeners are called.
    /// Returns `None` if a middleware rejected the socket or if the client connection
    /// was closed in the meantime.
    pub(crate) async fn add(
        self: &Arc<Self>,
        client: &Arc<Client<A>>,
        on_connected: impl FnOnce(&Arc<Socket<A>>),
    ) -> Option<Arc<Socket<A>>> {
        let socket = Arc::new(Socket::new(self.clone(), client.clone()));
        let res = self.run(&socket).await;

        if !client.is_open() {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?socket.id, ns = ?self.path, "connection closed during admission, discarding socket");
            return None;
        }

        if let Err(e) = res {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?socket.id, ns = ?self.path, "middleware rejected socket: {}", e);
            if let Err(_e) = socket.error(&e.to_string()) {
                #[cfg(feature = "tracing")]
                tracing::debug!(sid = ?socket.id, "error sending error packet: {}", _e);
            }
            return None;
        }

        self.track(&socket);
        if let Err(_e) = socket.on_connect().await {
            #[cfg(feature = "tracing")]
            tracing::warn!(sid = ?socket.id, ns = ?self.path, "could not join private room: {}", _e);
            self.remove(&socket);
            return None;
        }

        on_connected(&socket);
        for handler in self.listeners.get(CONNECT_EVENT) {
            handler(socket.clone());
        }
        for handler in self.listeners.get(CONNECTION_EVENT) {
            handler(socket.clone());
        }
        Some(socket)
    }

    pub(crate) fn track(&self, socket: &Arc<Socket<A>>) {
        #[cfg(feature = "tracing")]
        tracing::trace!(sid = ?socket.id, ns = ?self.path, "socket added to namespace");
        self.sockets.write().unwrap().insert(socket.id, socket.clone());
    }

    /// Stops tracking a socket. Removing an untracked socket is a no-op.
    pub(crate) fn remove(&self, socket: &Socket<A>) {
        if self.sockets.write().unwrap().remove(&socket.id).is_none() {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?socket.id, ns = ?self.path, "ignoring remove for untracked socket");
        }
    }

    /// Inserts the socket in the connected map. `set_state` runs under the map lock.
    pub(crate) fn insert_connected(&self, socket: &Arc<Socket<A>>, set_state: impl FnOnce()) {
        let mut connected = self.connected.write().unwrap();
        connected.insert(socket.id, socket.clone());
        set_state();
    }

    /// Removes the socket from the connected map. `set_state` runs under the map lock.
    pub(crate) fn remove_connected(&self, socket: &Socket<A>, set_state: impl FnOnce()) {
        let mut connected = self.connected.write().unwrap();
        connected.remove(&socket.id);
        set_state();
    }

    /// Emits an event to every connected socket of the namespace.
    pub fn emit<T: ?Sized + Serialize>(
        self: &Arc<Self>,
        event: impl Into<String>,
        data: &T,
    ) -> Result<(), EmitError> {
        BroadcastOperators::from_ns(self.clone()).emit(event, data)
    }

    /// Emits a `message` event to every connected socket of the namespace.
    pub fn send<T: ?Sized + Serialize>(self: &Arc<Self>, data: &T) -> Result<(), EmitError> {
        self.emit(MESSAGE_EVENT, data)
    }

    /// Selects the sockets of the given rooms for the next emit.
    pub fn to(self: &Arc<Self>, rooms: impl RoomParam) -> BroadcastOperators<A> {
        BroadcastOperators::from_ns(self.clone()).to(rooms)
    }

    /// Flags the next emit as volatile.
    pub fn volatile(self: &Arc<Self>) -> BroadcastOperators<A> {
        BroadcastOperators::from_ns(self.clone()).volatile()
    }

    /// Returns the connected socket with the given id.
    pub fn get_socket(&self, sid: Sid) -> Option<Arc<Socket<A>>> {
        self.connected.read().unwrap().get(&sid).cloned()
    }

    /// Returns every connected socket.
    pub fn sockets(&self) -> Vec<Arc<Socket<A>>> {
        self.connected.read().unwrap().values().cloned().collect()
    }

    /// Returns every non-empty room of the namespace.
    pub fn rooms(&self) -> Result<Vec<Room>, AdapterError> {
        self.adapter.rooms().map_err(Into::into)
    }

    /// The namespace path.
    pub fn path(&self) -> &Str {
        &self.path
    }
}

/// A type erased emitter to discard the adapter type parameter `A`.
/// Otherwise it creates a cyclic dependency between the namespace, the emitter and the adapter.
trait InnerEmitter: Send + Sync + 'static {
    fn get_all_sids(&self) -> Vec<Sid>;
    fn send_many(
        &self,
        sids: Vec<Sid>,
        frames: Vec<Frame>,
        volatile: bool,
    ) -> Result<(), Vec<SocketError>>;
}

impl<A: Adapter> InnerEmitter for Namespace<A> {
    fn get_all_sids(&self) -> Vec<Sid> {
        self.connected.read().unwrap().keys().copied().collect()
    }

    fn send_many(
        &self,
        sids: Vec<Sid>,
        frames: Vec<Frame>,
        volatile: bool,
    ) -> Result<(), Vec<SocketError>> {
        // Sockets are collected first so no lock is held while writing.
        let sockets: Vec<_> = {
            let connected = self.connected.read().unwrap();
            sids.iter()
                .filter_map(|sid| connected.get(sid))
                .cloned()
                .collect()
        };
        let errs: Vec<SocketError> = sockets
            .iter()
            .filter_map(|socket| socket.write_frames(frames.clone(), volatile).err())
            .collect();
        if errs.is_empty() { Ok(()) } else { Err(errs) }
    }
}

/// Internal interface implementor used by the adapter to reach the namespace sockets.
#[doc(hidden)]
pub struct Emitter {
    /// This `Weak<dyn>` allows to break the cyclic dependency between the namespace and the emitter.
    ns: Weak<dyn InnerEmitter>,
    parser: Arc<dyn Parse>,
    path: Str,
}

impl Emitter {
    fn new<A: Adapter>(ns: Weak<Namespace<A>>, parser: Arc<dyn Parse>, path: Str) -> Self {
        Self { ns, parser, path }
    }
}

impl SocketEmitter for Emitter {
    fn get_all_sids(&self) -> Vec<Sid> {
        self.ns
            .upgrade()
            .map(|ns| ns.get_all_sids())
            .unwrap_or_default()
    }

    fn send_many(
        &self,
        sids: Vec<Sid>,
        frames: Vec<Frame>,
        volatile: bool,
    ) -> Result<(), Vec<SocketError>> {
        match self.ns.upgrade() {
            Some(ns) => ns.send_many(sids, frames, volatile),
            None => Ok(()),
        }
    }

    fn path(&self) -> &Str {
        &self.path
    }

    fn parser(&self) -> Arc<dyn Parse> {
        self.parser.clone()
    }
}

#[cfg(test)]
impl Namespace<crate::adapter::LocalAdapter> {
    pub(crate) fn new_dummy(path: impl Into<Str>) -> Arc<Self> {
        Namespace::new(path.into(), &EngineConfig::default(), &())
    }
}

impl<A: Adapter> fmt::Debug for Namespace<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("path", &self.path)
            .field("sockets", &self.sockets)
            .field("connected", &self.connected.read().unwrap().len())
            .finish()
    }
}

#[cfg(feature = "tracing")]
impl<A: Adapter> Drop for Namespace<A> {
    fn drop(&mut self) {
        tracing::debug!("dropping namespace {}", self.path);
    }
}
