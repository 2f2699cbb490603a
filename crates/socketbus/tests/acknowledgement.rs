mod utils;

use std::time::Duration;

use fixture::{TestClient, timeout_rcv, timeout_rcv_none};
use serde_json::json;
use socketbus::{AckError, CloseReason, Engine, Packet, PacketData};
use tokio::sync::mpsc;

fn event_with_ack(ns: &'static str, event: &str, args: Vec<serde_json::Value>, ack_id: i64) -> Packet {
    let mut packet = Packet::event(ns, event, args);
    packet.inner.set_ack_id(ack_id);
    packet
}

#[tokio::test]
pub async fn emit_with_ack_called_once() {
    let engine = Engine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        let tx = tx.clone();
        assert_ok!(socket.emit_with_ack("question", &"ping", move |data| {
            assert_ok!(tx.send(data));
        }));
    });

    let mut client = TestClient::connect(&engine);
    assert_eq!(client.recv().await, Packet::connect("/"));
    assert_eq!(
        client.recv().await,
        event_with_ack("/", "question", vec![json!("ping")], 1)
    );

    client.send(Packet::ack("/", vec![json!("pong")], 1));
    client.send(Packet::ack("/", vec![json!("again")], 1));

    assert_eq!(timeout_rcv(&mut rx).await, [json!("pong")]);
    timeout_rcv_none(&mut rx).await;
}

#[tokio::test]
pub async fn ack_ids_are_increasing() {
    let engine = Engine::new();
    engine.on_connection(|socket| {
        for _ in 0..3 {
            assert_ok!(socket.emit_with_ack("count", &(), |_| {}));
        }
    });

    let mut client = TestClient::connect(&engine);
    assert_eq!(client.recv().await, Packet::connect("/"));
    for id in 1..=3 {
        let packet = client.recv().await;
        assert_eq!(packet.inner.ack_id(), Some(id));
    }
}

#[tokio::test]
pub async fn ack_sender_sends_once() {
    let engine = Engine::new();
    engine.on_connection(|socket| {
        socket.on("question", |_, args, ack| {
            let ack = assert_some!(ack);
            assert_ok!(ack.send(&args));
            assert_ok!(ack.clone().send(&"second"));
            assert!(ack.is_sent());
        });
    });

    let mut client = TestClient::connect(&engine);
    assert_eq!(client.recv().await, Packet::connect("/"));

    client.send(event_with_ack("/", "question", vec![json!(1), json!(2)], 3));
    assert_eq!(
        client.recv().await,
        Packet::ack("/", vec![json!(1), json!(2)], 3)
    );
    client.recv_none().await;
}

#[tokio::test]
pub async fn no_ack_sender_without_ack_id() {
    let engine = Engine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        let tx = tx.clone();
        socket.on("question", move |_, _, ack| {
            assert_ok!(tx.send(ack.is_none()));
        });
    });

    let client = TestClient::connect(&engine);
    client.send(Packet::event("/", "question", vec![]));
    assert!(timeout_rcv(&mut rx).await);
}

#[tokio::test]
pub async fn ack_future() {
    let engine = Engine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        let ack = assert_ok!(socket.emit_with_ack_future("question", &()));
        let tx = tx.clone();
        tokio::spawn(async move {
            assert_ok!(tx.send(ack.await));
        });
    });

    let mut client = TestClient::connect(&engine);
    assert_eq!(client.recv().await, Packet::connect("/"));
    let packet = client.recv().await;
    let ack_id = assert_some!(packet.inner.ack_id());

    client.send(Packet::ack("/", vec![json!({ "ok": true })], ack_id));
    let data = assert_ok!(timeout_rcv(&mut rx).await);
    assert_eq!(data, [json!({ "ok": true })]);
}

#[tokio::test]
pub async fn ack_future_timeout() {
    let engine = Engine::builder()
        .ack_timeout(Duration::from_millis(10))
        .build();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        let ack = assert_ok!(socket.emit_with_ack_future("question", &()));
        let tx = tx.clone();
        tokio::spawn(async move {
            assert_ok!(tx.send(ack.await));
        });
    });

    let _client = TestClient::connect(&engine);
    assert_eq!(timeout_rcv(&mut rx).await, Err(AckError::Timeout));
}

#[tokio::test]
pub async fn pending_acks_abandoned_on_disconnect() {
    let engine = Engine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        let ack = assert_ok!(socket.emit_with_ack_future("question", &()));
        let tx = tx.clone();
        tokio::spawn(async move {
            assert_ok!(tx.send(ack.await));
        });
    });

    let mut client = TestClient::connect(&engine);
    assert_eq!(client.recv().await, Packet::connect("/"));
    let ack_id = assert_some!(client.recv().await.inner.ack_id());

    client.close(CloseReason::TransportClose);
    assert_eq!(timeout_rcv(&mut rx).await, Err(AckError::Closed));
    assert_eq!(engine.clients_count(), 0);
    assert!(!client.is_open());
    assert!(ack_id > 0);
}

#[tokio::test]
pub async fn panicking_ack_callback() {
    let engine = Engine::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.on_connection(move |socket| {
        assert_ok!(socket.emit_with_ack("question", &(), |_| panic!("callback failure")));
        assert_ok!(tx.send(socket));
    });

    let mut client = TestClient::connect(&engine);
    let socket = timeout_rcv(&mut rx).await;
    assert_eq!(client.recv().await, Packet::connect("/"));
    let ack_id = assert_some!(client.recv().await.inner.ack_id());

    client.send(Packet::ack("/", vec![], ack_id));
    client.send(Packet::event("/", "after", vec![]));
    client.recv_none().await;

    assert!(socket.connected());
    assert!(client.is_open());
    assert_ok!(socket.emit("still-here", &()));
    assert_eq!(
        client.recv().await.inner,
        PacketData::Event(vec![json!("still-here")], None)
    );
}
