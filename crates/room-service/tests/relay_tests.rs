//! WebSocket relay endpoint tests over real sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::{SinkExt, StreamExt};
use session_test_utils::{room, TestRoomServer};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestRoomServer, code: &str) -> Socket {
    let (socket, _) = connect_async(server.ws_url(code)).await.unwrap();
    socket
}

async fn next_text(socket: &mut Socket) -> Option<String> {
    let read = async {
        while let Some(frame) = socket.next().await {
            if let Ok(Message::Text(text)) = frame {
                return Some(text);
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_millis(300), read)
        .await
        .ok()
        .flatten()
}

/// Wait until `count` sockets are attached to `code`.
async fn attached(server: &TestRoomServer, code: &str, count: usize) {
    let code = room(code);
    for _ in 0..100 {
        if server.hub().member_count(&code) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} members on {code}");
}

#[tokio::test]
async fn test_frames_fan_out_to_others_only() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut a = connect(&server, "RELAY").await;
    let mut b = connect(&server, "relay").await;
    let mut c = connect(&server, "ReLaY").await;
    attached(&server, "RELAY", 3).await;

    a.send(Message::Text("{\"opaque\":1}".to_string()))
        .await
        .unwrap();

    assert_eq!(next_text(&mut b).await.as_deref(), Some("{\"opaque\":1}"));
    assert_eq!(next_text(&mut c).await.as_deref(), Some("{\"opaque\":1}"));
    assert_eq!(next_text(&mut a).await, None, "sender must not get its own frame");
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut a = connect(&server, "ROOMA").await;
    let mut b = connect(&server, "ROOMB").await;
    attached(&server, "ROOMA", 1).await;
    attached(&server, "ROOMB", 1).await;

    a.send(Message::Text("hello".to_string())).await.unwrap();
    assert_eq!(next_text(&mut b).await, None);
}

#[tokio::test]
async fn test_closed_socket_detaches() {
    let server = TestRoomServer::spawn().await.unwrap();
    let mut a = connect(&server, "CLOSE").await;
    let _b = connect(&server, "CLOSE").await;
    attached(&server, "CLOSE", 2).await;

    a.close(None).await.unwrap();
    attached(&server, "CLOSE", 1).await;
}

#[tokio::test]
async fn test_invalid_code_rejected_before_upgrade() {
    let server = TestRoomServer::spawn().await.unwrap();
    let result = connect_async(server.ws_url("toolong")).await;
    assert!(result.is_err());
}
