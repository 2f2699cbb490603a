//! A complete session: two clients connect, exchange events and leave.
mod utils;

use fixture::{TestClient, timeout_rcv, timeout_rcv_none};
use serde_json::json;
use socketbus::{DisconnectReason, Engine, Packet};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
pub async fn login_broadcast_and_leave() {
    init_tracing();
    let engine = Engine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        assert_ok!(socket.emit("login", &json!({ "active": 1 })));
        assert_ok!(socket.broadcast().emit("user.joined", &socket.id.to_string()));

        let tx = tx.clone();
        socket.on_disconnect(move |socket, reason| {
            assert_ok!(tx.send((socket.id, reason)));
        });
    });

    let mut a = TestClient::connect(&engine);
    assert_eq!(a.recv().await, Packet::connect("/"));
    assert_eq!(
        a.recv().await,
        Packet::event("/", "login", vec![json!({ "active": 1 })])
    );

    let mut b = TestClient::connect(&engine);
    assert_eq!(b.recv().await, Packet::connect("/"));
    assert_eq!(
        b.recv().await,
        Packet::event("/", "login", vec![json!({ "active": 1 })])
    );
    // Only A is told that B joined
    assert_eq!(
        a.recv().await,
        Packet::event("/", "user.joined", vec![json!(b.sid.to_string())])
    );
    b.recv_none().await;

    a.send(Packet::disconnect("/"));
    b.send(Packet::disconnect("/"));

    let mut disconnected = Vec::new();
    for _ in 0..2 {
        let (sid, reason) = timeout_rcv(&mut rx).await;
        assert_eq!(reason, DisconnectReason::ClientNSDisconnect);
        assert_eq!(reason.to_string(), "client namespace disconnect");
        disconnected.push(sid);
    }
    timeout_rcv_none(&mut rx).await;
    assert!(disconnected.contains(&a.sid));
    assert!(disconnected.contains(&b.sid));
    assert!(engine.sockets().sockets().is_empty());

    // Both transports stay open, the clients may connect again
    assert!(a.is_open() && b.is_open());
}

#[tokio::test]
pub async fn echo_with_ack() {
    init_tracing();
    let engine = Engine::new();
    engine.on_connection(|socket| {
        socket.on("echo", |socket, args, ack| {
            match ack {
                Some(ack) => assert_ok!(ack.send(&args)),
                None => assert_ok!(socket.emit("echo", &args)),
            };
        });
    });

    let mut client = TestClient::connect(&engine);
    assert_eq!(client.recv().await, Packet::connect("/"));

    client.send(Packet::event("/", "echo", vec![json!("a"), json!(2)]));
    assert_eq!(
        client.recv().await,
        Packet::event("/", "echo", vec![json!("a"), json!(2)])
    );

    let mut packet = Packet::event("/", "echo", vec![json!([1, 2])]);
    packet.inner.set_ack_id(7);
    client.send(packet);
    assert_eq!(client.recv().await, Packet::ack("/", vec![json!([1, 2])], 7));
}
