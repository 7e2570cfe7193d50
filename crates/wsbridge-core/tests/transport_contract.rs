//! Behavioural contract shared by every WebSocket [`Adapter`].
//!
//! # Purpose
//!
//! The dispatcher treats adapters as interchangeable, so each check below
//! runs once against [`TungsteniteAdapter`] (raw TCP upgrade) and once
//! against [`AxumAdapter`] (upgrade inside an axum router), both driven by
//! the same `tokio-tungstenite` client:
//!
//! - a frame larger than the read buffer is split across reads, in order,
//! - binary mode writes Binary frames,
//! - text mode refuses bytes that are not UTF-8,
//! - a client Close frame is a clean end of stream,
//! - `close` is idempotent and unblocks a parked `read`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, OriginalUri, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wsbridge_core::transport::AxumAdapter;
use wsbridge_core::{Adapter, HandshakeRequest, TransportError, TungsteniteUpgrader};

const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy)]
enum Transport {
    Tungstenite,
    Axum,
}

/// Connects a client to a fresh server of the given kind and returns the
/// server-side adapter plus the client.
async fn connected_pair(transport: Transport) -> (Arc<dyn Adapter>, Client) {
    match transport {
        Transport::Tungstenite => tungstenite_pair().await,
        Transport::Axum => axum_pair().await,
    }
}

async fn tungstenite_pair() -> (Arc<dyn Adapter>, Client) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, remote) = listener.accept().await.unwrap();
        TungsteniteUpgrader::with_route("/websockify")
            .upgrade_stream(stream, Some(remote))
            .await
    });

    let (client, _) = connect_async(format!("ws://{addr}/websockify")).await.unwrap();
    let adapter = server.await.unwrap().unwrap();
    (Arc::new(adapter), client)
}

async fn axum_pair() -> (Arc<dyn Adapter>, Client) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/websockify",
        get(
            move |ws: WebSocketUpgrade,
                  ConnectInfo(remote): ConnectInfo<SocketAddr>,
                  OriginalUri(uri): OriginalUri,
                  headers: HeaderMap| {
                let tx = tx.clone();
                async move {
                    let request = HandshakeRequest::new(uri, headers).with_remote_addr(remote);
                    let response: Response = ws.on_upgrade(move |socket| async move {
                        let _ = tx.send(AxumAdapter::new(socket, request));
                    });
                    response
                }
            },
        ),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let (client, _) = connect_async(format!("ws://{addr}/websockify")).await.unwrap();
    let adapter = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    (Arc::new(adapter), client)
}

// ── Contract checks ───────────────────────────────────────────────────────────

async fn read_splits_large_frame(transport: Transport) {
    // Arrange
    let (adapter, mut client) = connected_pair(transport).await;
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    client.send(Message::Binary(payload.clone())).await.unwrap();

    // Act: read with a buffer much smaller than the frame
    let mut buf = [0u8; 1000];
    let mut out = Vec::new();
    while out.len() < payload.len() {
        let n = timeout(WAIT, adapter.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "{transport:?}: unexpected end of stream");
        out.extend_from_slice(&buf[..n]);
    }

    // Assert
    assert_eq!(out, payload, "{transport:?}");
}

async fn binary_mode_writes_binary_frames(transport: Transport) {
    let (adapter, mut client) = connected_pair(transport).await;
    adapter.set_binary_mode().await.unwrap();

    adapter.write(&[0x00, 0xFF, 0x10]).await.unwrap();

    let frame = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame, Message::Binary(vec![0x00, 0xFF, 0x10]), "{transport:?}");
}

async fn text_mode_rejects_invalid_utf8(transport: Transport) {
    let (adapter, _client) = connected_pair(transport).await;

    let result = adapter.write(&[0xFF, 0xFE]).await;

    assert!(matches!(result, Err(TransportError::Protocol(_))), "{transport:?}");
}

async fn client_close_is_end_of_stream(transport: Transport) {
    let (adapter, mut client) = connected_pair(transport).await;
    client.send(Message::Binary(vec![7])).await.unwrap();
    client.close(None).await.unwrap();

    let mut buf = [0u8; 16];
    let first = timeout(WAIT, adapter.read(&mut buf)).await.unwrap().unwrap();
    let end = timeout(WAIT, adapter.read(&mut buf)).await.unwrap().unwrap();

    assert_eq!(first, 1, "{transport:?}");
    assert_eq!(end, 0, "{transport:?}");
}

async fn close_is_idempotent_and_unblocks_reader(transport: Transport) {
    // Arrange: a read parked on a client that never sends
    let (adapter, mut client) = connected_pair(transport).await;
    let reader = tokio::spawn({
        let adapter = Arc::clone(&adapter);
        async move {
            let mut buf = [0u8; 8];
            adapter.read(&mut buf).await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Act
    adapter.close().await.unwrap();
    adapter.close().await.unwrap();

    // Assert
    let result = timeout(WAIT, reader).await.unwrap().unwrap();
    assert!(matches!(result, Err(TransportError::Closed)), "{transport:?}");
    assert!(matches!(adapter.write(b"x").await, Err(TransportError::Closed)));
    let frame = timeout(WAIT, client.next()).await.unwrap();
    assert!(
        matches!(frame, Some(Ok(Message::Close(_))) | None),
        "{transport:?}: {frame:?}"
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tungstenite_read_splits_large_frame() {
    read_splits_large_frame(Transport::Tungstenite).await;
}

#[tokio::test]
async fn test_axum_read_splits_large_frame() {
    read_splits_large_frame(Transport::Axum).await;
}

#[tokio::test]
async fn test_tungstenite_binary_mode_writes_binary_frames() {
    binary_mode_writes_binary_frames(Transport::Tungstenite).await;
}

#[tokio::test]
async fn test_axum_binary_mode_writes_binary_frames() {
    binary_mode_writes_binary_frames(Transport::Axum).await;
}

#[tokio::test]
async fn test_tungstenite_text_mode_rejects_invalid_utf8() {
    text_mode_rejects_invalid_utf8(Transport::Tungstenite).await;
}

#[tokio::test]
async fn test_axum_text_mode_rejects_invalid_utf8() {
    text_mode_rejects_invalid_utf8(Transport::Axum).await;
}

#[tokio::test]
async fn test_tungstenite_client_close_is_end_of_stream() {
    client_close_is_end_of_stream(Transport::Tungstenite).await;
}

#[tokio::test]
async fn test_axum_client_close_is_end_of_stream() {
    client_close_is_end_of_stream(Transport::Axum).await;
}

#[tokio::test]
async fn test_tungstenite_close_is_idempotent_and_unblocks_reader() {
    close_is_idempotent_and_unblocks_reader(Transport::Tungstenite).await;
}

#[tokio::test]
async fn test_axum_close_is_idempotent_and_unblocks_reader() {
    close_is_idempotent_and_unblocks_reader(Transport::Axum).await;
}
