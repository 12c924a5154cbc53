//! End-to-end session tests over a real WebSocket transport.
//!
//! Spawns the full router on an ephemeral port and drives it with
//! tokio-tungstenite clients, the same way a rendering client would.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::frame::{Data, Frame, Status};
use crate::state::test_helpers;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bind the app on an ephemeral port and return the ws URL.
async fn spawn_server() -> String {
    let state = test_helpers::test_app_state();
    let app = super::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("ws://{addr}/api/ws")
}

/// Connect and consume the `session:connected` welcome, returning the
/// client together with its assigned id.
async fn connect(url: &str) -> (WsClient, String) {
    let (mut ws, _) = connect_async(url).await.expect("ws connect");
    let welcome = recv_frame(&mut ws).await;
    assert_eq!(welcome.syscall, "session:connected");
    let client_id = welcome
        .data
        .get("client_id")
        .and_then(|v| v.as_str())
        .expect("client_id in welcome")
        .to_string();
    (ws, client_id)
}

async fn send_frame(ws: &mut WsClient, syscall: &str, data: Data) -> Frame {
    let frame = Frame::request(syscall, data);
    let text = serde_json::to_string(&frame).expect("serialize frame");
    ws.send(WsMessage::text(text)).await.expect("ws send");
    frame
}

async fn recv_frame(ws: &mut WsClient) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("ws receive timed out")
            .expect("ws stream ended")
            .expect("ws receive failed");
        match msg {
            WsMessage::Text(text) => {
                return serde_json::from_str(&text).expect("frame json");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            other => panic!("unexpected ws message: {other:?}"),
        }
    }
}

/// Receive frames until one matches `syscall`, skipping unrelated traffic.
async fn recv_syscall(ws: &mut WsClient, syscall: &str) -> Frame {
    for _ in 0..10 {
        let frame = recv_frame(ws).await;
        if frame.syscall == syscall {
            return frame;
        }
    }
    panic!("never received {syscall}");
}

async fn join(ws: &mut WsClient, room_id: &str) -> Frame {
    let mut data = Data::new();
    data.insert("room_id".into(), json!(room_id));
    let req = send_frame(ws, "room:join", data).await;
    let reply = recv_syscall(ws, "room:join").await;
    assert_eq!(reply.parent_id, Some(req.id));
    assert_eq!(reply.status, Status::Done);
    reply
}

#[tokio::test]
async fn two_clients_share_a_board() {
    let url = spawn_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, b_id) = connect(&url).await;

    let reply = join(&mut a, "studio").await;
    assert_eq!(reply.data.get("peers").and_then(|v| v.as_array()).map(Vec::len), Some(0));

    let reply = join(&mut b, "studio").await;
    assert_eq!(reply.data.get("peers").and_then(|v| v.as_array()).map(Vec::len), Some(1));

    // A hears B join.
    let notice = recv_syscall(&mut a, "room:join").await;
    assert_eq!(notice.data.get("client_id").and_then(|v| v.as_str()), Some(b_id.as_str()));

    // A draws; B receives the stroke with the same id A was acked with.
    let mut data = Data::new();
    data.insert("points".into(), json!([0.0, 0.0, 5.0, 5.0]));
    data.insert("color".into(), json!("#111111"));
    data.insert("size".into(), json!(2.0));
    send_frame(&mut a, "stroke:add", data).await;
    let ack = recv_syscall(&mut a, "stroke:add").await;
    assert_eq!(ack.status, Status::Done);
    let stroke_id = ack.data.get("id").and_then(|v| v.as_str()).unwrap().to_string();

    let seen = recv_syscall(&mut b, "stroke:add").await;
    assert_eq!(seen.data.get("id").and_then(|v| v.as_str()), Some(stroke_id.as_str()));
    assert!(seen.parent_id.is_none());
}

#[tokio::test]
async fn late_joiner_receives_existing_state() {
    let url = spawn_server().await;
    let (mut a, _) = connect(&url).await;
    join(&mut a, "persist").await;

    let mut data = Data::new();
    data.insert("x".into(), json!(40.0));
    data.insert("y".into(), json!(60.0));
    data.insert("text".into(), json!("remember me"));
    send_frame(&mut a, "note:create", data).await;
    recv_syscall(&mut a, "note:create").await;

    let (mut b, _) = connect(&url).await;
    let reply = join(&mut b, "persist").await;
    let notes = reply.data.get("notes").and_then(|v| v.as_array()).expect("notes");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].get("text").and_then(|v| v.as_str()), Some("remember me"));
}

#[tokio::test]
async fn undo_from_peer_syncs_both_clients() {
    let url = spawn_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;
    join(&mut a, "shared-history").await;
    join(&mut b, "shared-history").await;
    recv_syscall(&mut a, "room:join").await;

    let mut data = Data::new();
    data.insert("points".into(), json!([1.0, 1.0, 2.0, 2.0]));
    data.insert("color".into(), json!("#222222"));
    data.insert("size".into(), json!(4.0));
    send_frame(&mut a, "stroke:add", data).await;
    recv_syscall(&mut a, "stroke:add").await;
    recv_syscall(&mut b, "stroke:add").await;

    // B undoes A's stroke: both clients get the same rewritten snapshot.
    send_frame(&mut b, "history:undo", Data::new()).await;
    let sync_a = recv_syscall(&mut a, "board:sync").await;
    let sync_b = recv_syscall(&mut b, "board:sync").await;
    assert_eq!(sync_a.data.get("strokes").and_then(|v| v.as_array()).map(Vec::len), Some(0));
    assert_eq!(sync_b.data.get("strokes").and_then(|v| v.as_array()).map(Vec::len), Some(0));
}

#[tokio::test]
async fn disconnect_notifies_peers() {
    let url = spawn_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, b_id) = connect(&url).await;
    join(&mut a, "farewell").await;
    join(&mut b, "farewell").await;
    recv_syscall(&mut a, "room:join").await;

    b.close(None).await.expect("close");

    let part = recv_syscall(&mut a, "room:part").await;
    assert_eq!(part.data.get("client_id").and_then(|v| v.as_str()), Some(b_id.as_str()));
}

#[tokio::test]
async fn cursor_burst_delivers_final_position() {
    let url = spawn_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;
    join(&mut a, "pointer").await;
    join(&mut b, "pointer").await;
    recv_syscall(&mut a, "room:join").await;

    // Fire a burst well under the broadcast interval.
    for i in 0..20 {
        let mut data = Data::new();
        data.insert("x".into(), json!(f64::from(i)));
        data.insert("y".into(), json!(0.0));
        send_frame(&mut a, "cursor:move", data).await;
    }

    // Intermediate positions may coalesce away, but the final one always
    // arrives once the connection tick flushes the gate.
    let mut deliveries = 0;
    loop {
        let moved = recv_syscall(&mut b, "cursor:moved").await;
        deliveries += 1;
        if moved.data.get("x").and_then(serde_json::Value::as_f64) == Some(19.0) {
            break;
        }
        assert!(deliveries < 20, "final cursor position never delivered");
    }
    // Coalescing dropped at least some of the 20 raw moves.
    assert!(deliveries < 20);
}

#[tokio::test]
async fn error_frames_correlate_to_requests() {
    let url = spawn_server().await;
    let (mut a, _) = connect(&url).await;

    let req = send_frame(&mut a, "stroke:add", Data::new()).await;
    let err = recv_syscall(&mut a, "stroke:add").await;
    assert_eq!(err.status, Status::Error);
    assert_eq!(err.parent_id, Some(req.id));
}
