use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use roulette_core::config::ChatParameters;
use roulette_core::spark::{
    ChatRequest, Connection, SignedRequest, StreamSession, Transport, WsTransport,
};
use roulette_core::testing::{final_frame, text_frame};

/// How the local peer ends the connection after sending its frames
#[derive(Clone, Copy)]
enum Ending {
    /// Keep reading until the client goes away
    Listen,
    /// Send a close frame, then read the client's reply
    Close,
    /// Drop the socket without a closing handshake
    Reset,
}

/// Accepts one WebSocket connection on loopback, sends `frames`, ends as
/// told and returns every message the client sent.
async fn peer(frames: Vec<Message>, ending: Ending) -> (String, JoinHandle<Vec<Message>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v4.0/chat", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        match ending {
            Ending::Reset => return Vec::new(),
            Ending::Close => ws.close(None).await.unwrap(),
            Ending::Listen => {}
        }
        let mut received = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            received.push(msg);
        }
        received
    });
    (url, task)
}

fn signed(url: String) -> SignedRequest {
    SignedRequest {
        url,
        date: "Sat, 17 Oct 2026 08:30:00 GMT".into(),
        authorization: "sig".into(),
    }
}

fn request(text: &str) -> ChatRequest {
    let params = ChatParameters {
        domain: "4.0Ultra".into(),
        max_tokens: 4096,
        top_k: 6,
        temperature: 0.5,
    };
    ChatRequest::extraction("app", None, &params, "extract", text)
}

fn close_frames(received: &[Message]) -> usize {
    received
        .iter()
        .filter(|m| matches!(m, Message::Close(_)))
        .count()
}

#[tokio::test]
async fn test_session_over_websocket() {
    let (url, peer) = peer(
        vec![
            Message::Text(text_frame("tea\n")),
            Message::Binary(final_frame("coffee").into_bytes()),
        ],
        Ending::Listen,
    )
    .await;

    let handle = StreamSession::open(Arc::new(WsTransport::new()), signed(url), request("tea or coffee"));
    let text = handle.wait(Duration::from_secs(5)).await.unwrap();
    assert_eq!(text, "tea\ncoffee");

    let received = timeout(Duration::from_secs(5), peer).await.unwrap().unwrap();
    match &received[0] {
        Message::Text(body) => {
            let sent: ChatRequest = serde_json::from_str(body).unwrap();
            assert_eq!(sent.user_text(), Some("tea or coffee"));
        }
        other => panic!("expected the request as a text frame, got {other:?}"),
    }
    assert_eq!(close_frames(&received), 1);
}

#[tokio::test]
async fn test_peer_close_ends_stream() {
    let (url, _peer) = peer(
        vec![
            Message::Ping(b"hb".to_vec()),
            Message::Text(text_frame("a\n")),
        ],
        Ending::Close,
    )
    .await;

    let mut conn = WsTransport::new().connect(&url).await.unwrap();
    assert_eq!(conn.recv_text().await.unwrap().unwrap(), text_frame("a\n"));
    assert!(conn.recv_text().await.is_none());
    // already closed by the peer
    conn.close().await;
}

#[tokio::test]
async fn test_peer_close_before_final_fails_session() {
    let (url, _peer) = peer(vec![Message::Text(text_frame("a\n"))], Ending::Close).await;

    let handle = StreamSession::open(Arc::new(WsTransport::new()), signed(url), request("a b"));
    let err = handle.wait(Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(err.code(), "TRANSPORT_ERROR");
    assert!(err.to_string().contains("before the final chunk"));
}

#[tokio::test]
async fn test_non_utf8_binary_frame_is_protocol_error() {
    let (url, _peer) = peer(vec![Message::Binary(vec![0xff, 0xfe, 0xfd])], Ending::Listen).await;

    let mut conn = WsTransport::new().connect(&url).await.unwrap();
    let err = conn.recv_text().await.unwrap().unwrap_err();
    assert_eq!(err.code(), "PROTOCOL_ERROR");
    conn.close().await;
}

#[tokio::test]
async fn test_reset_without_close_is_transport_error() {
    let (url, _peer) = peer(vec![Message::Text(text_frame("a"))], Ending::Reset).await;

    let mut conn = WsTransport::new().connect(&url).await.unwrap();
    assert!(conn.recv_text().await.unwrap().is_ok());
    let err = conn.recv_text().await.unwrap().unwrap_err();
    assert_eq!(err.code(), "TRANSPORT_ERROR");
}

#[tokio::test]
async fn test_close_sends_one_close_frame() {
    let (url, peer) = peer(Vec::new(), Ending::Listen).await;

    let mut conn = WsTransport::new().connect(&url).await.unwrap();
    conn.close().await;
    conn.close().await;
    drop(conn);

    let received = timeout(Duration::from_secs(5), peer).await.unwrap().unwrap();
    assert_eq!(close_frames(&received), 1);
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = WsTransport::new()
        .connect(&format!("ws://{addr}/v4.0/chat"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "TRANSPORT_ERROR");
}
