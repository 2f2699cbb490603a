mod utils;

use std::{sync::Arc, time::Duration};

use fixture::{TestClient, timeout_rcv};
use serde_json::json;
use socketbus::{
    AdapterError, Engine, Packet, Sid,
    adapter::{Adapter, CoreAdapter, CoreLocalAdapter, Room},
    ns::Emitter,
    socket::Socket,
};
use tokio::sync::mpsc;

async fn connect_many<A: Adapter>(
    engine: &Arc<Engine<A>>,
    n: usize,
) -> Vec<(TestClient<A>, Arc<Socket<A>>)> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = engine.on_connection(move |socket| {
        assert_ok!(tx.send(socket));
    });
    let mut res = Vec::with_capacity(n);
    for _ in 0..n {
        let mut client = TestClient::connect(engine);
        assert_eq!(client.recv().await, Packet::connect("/"));
        let socket = timeout_rcv(&mut rx).await;
        assert_eq!(socket.id, client.sid);
        res.push((client, socket));
    }
    engine.sockets().off("connection", id);
    res
}

#[tokio::test]
pub async fn room_broadcast_excludes_sender() {
    let engine = Engine::new();
    let mut peers = connect_many(&engine, 3).await;
    for (_, socket) in &peers[..2] {
        assert_ok!(socket.join("lobby").await);
    }

    let sender = peers[0].1.clone();
    assert_ok!(sender.to("lobby").emit("msg", &"hi"));
    assert_eq!(
        peers[1].0.recv().await,
        Packet::event("/", "msg", vec![json!("hi")])
    );
    peers[0].0.recv_none().await;
    peers[2].0.recv_none().await;

    // The room selection does not leak to the next emit
    assert_ok!(sender.emit("direct", &()));
    assert_eq!(
        peers[0].0.recv().await,
        Packet::event("/", "direct", vec![])
    );
    peers[1].0.recv_none().await;
}

#[tokio::test]
pub async fn multiple_rooms_send_once() {
    let engine = Engine::new();
    let mut peers = connect_many(&engine, 2).await;
    let receiver = &peers[1].1;
    assert_ok!(receiver.join("a").await);
    assert_ok!(receiver.join("b").await);

    assert_ok!(engine.to(["a", "b"]).emit("both", &()));
    assert_eq!(peers[1].0.recv().await, Packet::event("/", "both", vec![]));
    peers[1].0.recv_none().await;
    peers[0].0.recv_none().await;
}

#[tokio::test]
pub async fn private_room() {
    let engine = Engine::new();
    let mut peers = connect_many(&engine, 2).await;
    let target = peers[1].1.id;

    assert_ok!(engine.to(target.to_string()).emit("private", &()));
    assert_eq!(peers[1].0.recv().await, Packet::event("/", "private", vec![]));
    peers[0].0.recv_none().await;
}

#[tokio::test]
pub async fn leave_room() {
    let engine = Engine::new();
    let mut peers = connect_many(&engine, 1).await;
    let (client, socket) = &mut peers[0];

    assert_ok!(socket.join("lobby").await);
    assert_ok!(socket.join("lobby").await);
    assert_eq!(socket.rooms(), [socket.id.to_string(), "lobby".to_string()]);

    assert_ok!(socket.leave("lobby").await);
    assert_ok!(socket.leave("lobby").await);
    assert_eq!(socket.rooms(), [socket.id.to_string()]);
    assert!(assert_ok!(engine.to("lobby").sockets()).is_empty());

    assert_ok!(engine.to("lobby").emit("nobody", &()));
    client.recv_none().await;
}

#[tokio::test]
pub async fn rooms_cleared_on_disconnect() {
    let engine = Engine::new();
    let peers = connect_many(&engine, 2).await;
    assert_ok!(peers[0].1.join("lobby").await);
    assert_ok!(peers[1].1.join("lobby").await);

    let (tx, mut rx) = mpsc::unbounded_channel();
    peers[0].1.on_disconnect(move |_, _| {
        assert_ok!(tx.send(()));
    });
    peers[0].0.send(Packet::disconnect("/"));
    timeout_rcv(&mut rx).await;

    let sockets = assert_ok!(engine.to("lobby").sockets());
    assert_eq!(sockets, [peers[1].1.id]);
    let rooms = assert_ok!(engine.sockets().rooms());
    assert!(!rooms.iter().any(|r| *r == peers[0].1.id.to_string()));
}

#[derive(Debug, thiserror::Error)]
#[error("room {0} is forbidden")]
struct Forbidden(Room);

impl From<Forbidden> for AdapterError {
    fn from(err: Forbidden) -> Self {
        AdapterError(Box::new(err))
    }
}

/// An adapter answering room joins asynchronously, as a remote store would.
struct DelayedAdapter(CoreLocalAdapter<Emitter>);

impl CoreAdapter<Emitter> for DelayedAdapter {
    type Error = Forbidden;
    type State = Duration;

    fn new(_state: &Self::State, local: CoreLocalAdapter<Emitter>) -> Self {
        Self(local)
    }

    fn add(
        &self,
        sid: Sid,
        room: Room,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if room == "forbidden" {
                return Err(Forbidden(room));
            }
            self.0.add(sid, room);
            Ok(())
        }
    }

    fn get_local(&self) -> &CoreLocalAdapter<Emitter> {
        &self.0
    }
}

#[tokio::test]
pub async fn delayed_adapter_join() {
    let engine = Engine::builder()
        .with_adapter::<DelayedAdapter>(Duration::from_millis(5))
        .build();
    let mut peers = connect_many(&engine, 2).await;
    let socket = peers[0].1.clone();

    // The connect packet was only written once the private room was joined
    assert_eq!(socket.rooms(), [socket.id.to_string()]);

    let err = assert_err!(socket.join("forbidden").await);
    assert_eq!(err.to_string(), "room forbidden is forbidden");
    assert_eq!(socket.rooms(), [socket.id.to_string()]);

    assert_ok!(socket.join("lobby").await);
    assert_ok!(peers[1].1.to("lobby").emit("delayed", &()));
    assert_eq!(peers[0].0.recv().await, Packet::event("/", "delayed", vec![]));
}
