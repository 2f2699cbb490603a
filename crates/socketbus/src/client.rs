//! A [`Client`] is bound to one transport connection.
//!
//! It decodes the incoming frames, routes the decoded packets to the socket of their namespace
//! and writes the outgoing packets through the connection. All the inbound traffic of a client
//! is processed by a single task, in arrival order.
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use socketbus_core::{
    DEFAULT_NS, Sid, Str,
    packet::{Packet, PacketData},
    parser::Decoder,
    transport::{CloseReason, Connection, Frame, ReadyState},
};
use tokio::sync::mpsc;

use crate::{
    adapter::{Adapter, LocalAdapter},
    engine::Engine,
    errors::{SendError, SocketError},
    socket::Socket,
};

/// A packet to write to a client.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// A packet that still has to be encoded by the engine parser
    Packet(Packet),
    /// Already encoded frames, written verbatim
    Encoded(Vec<Frame>),
}

impl From<Packet> for Outgoing {
    fn from(packet: Packet) -> Self {
        Self::Packet(packet)
    }
}

/// The messages drained by the client task.
#[derive(Debug)]
pub(crate) enum Inbound {
    Data(Frame),
    Close(CloseReason),
}

struct ClientState<A: Adapter> {
    /// Sockets in join order
    sockets: Vec<Arc<Socket<A>>>,
    nsps: HashMap<Str, Arc<Socket<A>>>,
    /// Namespaces requested before the default namespace was connected.
    /// Set to `None` once drained.
    connect_buffer: Option<Vec<Str>>,
}

/// A client bound to one transport connection. It holds at most one [`Socket`] per namespace.
pub struct Client<A: Adapter = LocalAdapter> {
    sid: Sid,
    engine: Arc<Engine<A>>,
    conn: Arc<dyn Connection>,
    decoder: Mutex<Option<Box<dyn Decoder>>>,
    state: Mutex<ClientState<A>>,
    destroyed: AtomicBool,
    tx: mpsc::Sender<Inbound>,
}

impl<A: Adapter> Client<A> {
    pub(crate) fn new(
        engine: Arc<Engine<A>>,
        conn: Arc<dyn Connection>,
    ) -> (Arc<Self>, mpsc::Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel(engine.config.max_buffer_size);
        let decoder = engine.config.parser.decoder();
        let client = Self {
            sid: conn.sid(),
            engine,
            conn,
            decoder: Mutex::new(Some(decoder)),
            state: Mutex::new(ClientState {
                sockets: Vec::new(),
                nsps: HashMap::new(),
                connect_buffer: Some(Vec::new()),
            }),
            destroyed: AtomicBool::new(false),
            tx,
        };
        (Arc::new(client), rx)
    }

    /// The client task. Connects the default namespace and then drains the inbound queue
    /// until the connection is closed.
    pub(crate) async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Inbound>) {
        self.connect(DEFAULT_NS).await;
        while let Some(msg) = rx.recv().await {
            match msg {
                Inbound::Data(frame) => self.on_data(frame).await,
                Inbound::Close(reason) => {
                    self.on_close(reason);
                    break;
                }
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.sid, "client task terminated");
    }

    /// Enqueues an inbound message without waiting.
    pub(crate) fn push(&self, msg: Inbound) -> Result<(), SocketError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SocketError::InternalChannelFull,
            mpsc::error::TrySendError::Closed(_) => SocketError::Closed,
        })
    }

    /// Enqueues an inbound message, waiting for room in the queue.
    pub(crate) async fn push_wait(&self, msg: Inbound) -> Result<(), SocketError> {
        self.tx.send(msg).await.map_err(|_| SocketError::Closed)
    }

    /// The session id of the underlying connection.
    pub fn sid(&self) -> Sid {
        self.sid
    }

    /// Returns true if the underlying connection is open.
    pub fn is_open(&self) -> bool {
        self.conn.ready_state() == ReadyState::Open
    }

    /// Returns the socket of this client in the given namespace.
    pub fn get_socket(&self, ns: &str) -> Option<Arc<Socket<A>>> {
        self.state.lock().unwrap().nsps.get(ns).cloned()
    }

    /// Connects this client to a namespace.
    ///
    /// Connecting a namespace already joined is a no-op. Non-default namespaces requested before
    /// the default one is connected are buffered and connected right after it.
    pub async fn connect(self: &Arc<Self>, name: impl Into<Str>) {
        let mut queue = VecDeque::from([name.into()]);
        while let Some(name) = queue.pop_front() {
            {
                let mut state = self.state.lock().unwrap();
                if state.nsps.contains_key(&name) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = ?self.sid, ns = ?name, "namespace already connected");
                    continue;
                }
                if name != DEFAULT_NS && !state.nsps.contains_key(DEFAULT_NS) {
                    if let Some(buffer) = state.connect_buffer.as_mut() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(sid = ?self.sid, ns = ?name, "buffering namespace connect");
                        buffer.push(name);
                        continue;
                    }
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?self.sid, ns = ?name, "connecting to namespace");

            let ns = self.engine.of(name.clone());
            let socket = ns.add(self, |socket| self.register(socket)).await;

            if socket.is_some() && name == DEFAULT_NS {
                let buffer = self.state.lock().unwrap().connect_buffer.take();
                queue.extend(buffer.into_iter().flatten());
            }
        }
    }

    /// Tracks a newly connected socket.
    pub(crate) fn register(&self, socket: &Arc<Socket<A>>) {
        let mut state = self.state.lock().unwrap();
        state.sockets.push(socket.clone());
        state.nsps.insert(socket.ns.path.clone(), socket.clone());
    }

    /// Writes a packet to the connection.
    ///
    /// It is a no-op if the connection is not open. A volatile packet is dropped if the
    /// connection cannot be written right now.
    pub fn packet(&self, packet: Outgoing, volatile: bool) -> Result<(), SendError> {
        if !self.is_open() {
            #[cfg(feature = "tracing")]
            tracing::trace!(sid = ?self.sid, "connection not open, ignoring packet");
            return Ok(());
        }
        let frames = match packet {
            Outgoing::Packet(packet) => self.engine.config.parser.encode(&packet)?,
            Outgoing::Encoded(frames) => frames,
        };
        self.write(frames, volatile)?;
        Ok(())
    }

    /// Writes encoded frames to the connection, see [`Client::packet`].
    pub(crate) fn write(&self, frames: Vec<Frame>, volatile: bool) -> Result<(), SocketError> {
        if !self.is_open() {
            #[cfg(feature = "tracing")]
            tracing::trace!(sid = ?self.sid, "connection not open, ignoring packet");
            return Ok(());
        }
        if volatile && !self.conn.is_writable() {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?self.sid, "connection not writable, dropping volatile packet");
            return Ok(());
        }
        for frame in frames {
            self.conn.write(frame)?;
        }
        Ok(())
    }

    /// Disconnects every socket of this client, in join order, and closes the connection.
    pub fn disconnect(&self) {
        loop {
            let socket = {
                let mut state = self.state.lock().unwrap();
                if state.sockets.is_empty() {
                    break;
                }
                let socket = state.sockets.remove(0);
                state.nsps.remove(&socket.ns.path);
                socket
            };
            socket.disconnect(false);
        }
        self.close();
    }

    /// Forces the connection closed. Every socket is torn down when the transport reports the close.
    pub fn close(&self) {
        self.close_with(CloseReason::ForcedServerClose);
    }

    pub(crate) fn close_with(&self, reason: CloseReason) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.sid, ?reason, "closing connection");
        self.conn.close(reason);
    }

    /// Stops tracking a socket. Removing an untracked socket is a no-op.
    pub(crate) fn remove(&self, socket: &Arc<Socket<A>>) {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.sockets.iter().position(|s| Arc::ptr_eq(s, socket)) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = ?self.sid, ns = ?socket.ns.path, "ignoring remove for untracked socket");
            return;
        };
        state.sockets.remove(pos);
        if state
            .nsps
            .get(&socket.ns.path)
            .is_some_and(|s| Arc::ptr_eq(s, socket))
        {
            state.nsps.remove(&socket.ns.path);
        }
    }

    async fn on_data(self: &Arc<Self>, frame: Frame) {
        let res = {
            let mut decoder = self.decoder.lock().unwrap();
            match decoder.as_mut() {
                Some(decoder) => decoder.add(frame),
                None => return,
            }
        };
        let packets = match res {
            Ok(packets) => packets,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(sid = ?self.sid, "error decoding frame: {}", _e);
                self.conn.close(CloseReason::PacketParsingError);
                return;
            }
        };
        for packet in packets {
            self.on_decoded(packet).await;
        }
    }

    async fn on_decoded(self: &Arc<Self>, packet: Packet) {
        #[cfg(feature = "tracing")]
        tracing::trace!(sid = ?self.sid, ?packet, "packet received");

        match packet.inner {
            PacketData::Connect => self.connect(packet.ns).await,
            inner => match self.get_socket(&packet.ns) {
                Some(socket) => socket.on_packet(inner),
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = ?self.sid, ns = ?packet.ns, "no socket for namespace, dropping packet");
                }
            },
        }
    }

    /// Tears the client down once: every socket is closed with the same reason,
    /// then the decoder is released.
    pub(crate) fn on_close(&self, reason: CloseReason) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = ?self.sid, ?reason, "connection closed");

        self.engine.remove_client(self.sid);
        let sockets = self.state.lock().unwrap().sockets.clone();
        for socket in sockets {
            socket.on_close(reason.into());
        }
        if let Some(mut decoder) = self.decoder.lock().unwrap().take() {
            decoder.destroy();
        }
    }
}

impl<A: Adapter> fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Client")
            .field("sid", &self.sid)
            .field("namespaces", &state.nsps.keys().collect::<Vec<_>>())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::RwLock;

    use socketbus_core::{errors::ParserError, parser::Parse};
    use socketbus_parser_json::JsonParser;

    use super::*;

    /// An in-memory connection recording every written frame.
    #[derive(Debug)]
    pub(crate) struct DummyConn {
        sid: Sid,
        state: RwLock<ReadyState>,
        writable: AtomicBool,
        tx: mpsc::UnboundedSender<Frame>,
    }

    impl DummyConn {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = Self {
                sid: Sid::new(),
                state: RwLock::new(ReadyState::Open),
                writable: AtomicBool::new(true),
                tx,
            };
            (Arc::new(conn), rx)
        }

        pub(crate) fn set_writable(&self, writable: bool) {
            self.writable.store(writable, Ordering::SeqCst);
        }
    }

    impl Connection for DummyConn {
        fn sid(&self) -> Sid {
            self.sid
        }
        fn ready_state(&self) -> ReadyState {
            *self.state.read().unwrap()
        }
        fn is_writable(&self) -> bool {
            self.writable.load(Ordering::SeqCst)
        }
        fn write(&self, frame: Frame) -> Result<(), SocketError> {
            self.tx.send(frame).map_err(|_| SocketError::Closed)
        }
        fn close(&self, _reason: CloseReason) {
            *self.state.write().unwrap() = ReadyState::Closed;
        }
    }

    impl Client<LocalAdapter> {
        /// Creates a client bound to a [`DummyConn`], without a running task.
        pub(crate) fn new_dummy() -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
            let (conn, rx) = DummyConn::new();
            let (client, _) = Client::new(Engine::new(), conn);
            (client, rx)
        }
    }

    fn decode(frame: Frame) -> Packet {
        serde_json::from_str(frame.as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn buffer_connect_until_default_ns() {
        let engine = Engine::new();
        let (conn, mut rx) = DummyConn::new();
        let (client, _inbound) = Client::new(engine.clone(), conn);

        client.connect("/admin").await;
        assert!(client.get_socket("/admin").is_none());
        assert!(rx.try_recv().is_err());

        client.connect("/").await;
        assert_eq!(decode(rx.try_recv().unwrap()), Packet::connect("/"));
        assert_eq!(decode(rx.try_recv().unwrap()), Packet::connect("/admin"));
        assert!(client.get_socket("/admin").is_some());
        assert!(client.state.lock().unwrap().connect_buffer.is_none());
    }

    #[tokio::test]
    async fn connect_twice_is_noop() {
        let engine = Engine::new();
        let (conn, mut rx) = DummyConn::new();
        let (client, _inbound) = Client::new(engine.clone(), conn);

        client.connect("/").await;
        client.connect("/").await;
        rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(client.state.lock().unwrap().sockets.len(), 1);
    }

    #[tokio::test]
    async fn volatile_dropped_when_not_writable() {
        let (conn, mut rx) = DummyConn::new();
        let (client, _inbound) = Client::new(Engine::new(), conn.clone());

        conn.set_writable(false);
        client
            .packet(Packet::event("/", "ev", vec![]).into(), true)
            .unwrap();
        assert!(rx.try_recv().is_err());

        client
            .packet(Packet::event("/", "ev", vec![]).into(), false)
            .unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn closed_connection_ignores_packets() {
        let (conn, mut rx) = DummyConn::new();
        let (client, _inbound) = Client::new(Engine::new(), conn.clone());
        conn.close(CloseReason::TransportClose);

        client
            .packet(Outgoing::Encoded(vec![Frame::from("raw")]), false)
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    /// A parser that cannot encode anything.
    #[derive(Debug)]
    struct FailingParser;

    impl Parse for FailingParser {
        fn encode(&self, _: &Packet) -> Result<Vec<Frame>, ParserError> {
            Err(ParserError::UnexpectedBinaryPacket)
        }

        fn decoder(&self) -> Box<dyn Decoder> {
            JsonParser.decoder()
        }
    }

    #[tokio::test]
    async fn closed_connection_skips_encoding() {
        let engine = Engine::builder().with_parser(FailingParser).build();
        let (conn, mut rx) = DummyConn::new();
        let (client, _inbound) = Client::new(engine, conn.clone());

        let res = client.packet(Packet::event("/", "ev", vec![]).into(), false);
        assert!(matches!(res, Err(SendError::Encode(_))));

        conn.close(CloseReason::TransportClose);
        client
            .packet(Packet::event("/", "ev", vec![]).into(), false)
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn on_close_tears_down_sockets_once() {
        let (conn, _rx) = DummyConn::new();
        let (client, _inbound) = Client::new(Engine::new(), conn);
        client.connect("/").await;
        client.connect("/chat").await;

        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sockets = client.state.lock().unwrap().sockets.clone();
        for socket in &sockets {
            let count = count.clone();
            socket.on_disconnect(move |_, reason| {
                assert_eq!(reason, crate::DisconnectReason::TransportClose);
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        client.on_close(CloseReason::TransportClose);
        client.on_close(CloseReason::TransportClose);

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(sockets.iter().all(|s| s.disconnected()));
        assert!(client.state.lock().unwrap().sockets.is_empty());
        assert!(client.decoder.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_untracked_socket() {
        let (client, _rx) = Client::new_dummy();
        let ns = client.engine.of("/");
        let socket = Arc::new(Socket::new(ns, client.clone()));
        client.remove(&socket);
        client.remove(&socket);
        assert!(client.state.lock().unwrap().sockets.is_empty());
    }
}
