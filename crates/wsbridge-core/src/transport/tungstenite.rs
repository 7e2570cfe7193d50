//! [`Adapter`] and [`Upgrader`] backed by `tokio-tungstenite`.
//!
//! The WebSocket stream is split into a sink and a stream, each behind its
//! own async mutex, so the two relay directions can read and write at the
//! same time.  A watch channel carries the "closed" state: `close` flips it,
//! which wakes any `read` parked on the next frame.
//!
//! # Framing
//!
//! - Binary frames are returned as-is.  A frame larger than the caller's
//!   buffer is handed out over several `read` calls.
//! - Text frames are returned as their UTF-8 bytes.
//! - Ping/Pong frames are consumed (tungstenite queues the Pong reply).
//! - A Close frame or the end of the stream is a clean end (`Ok(0)`).
//! - `write` sends Binary frames once [`Adapter::set_binary_mode`] was
//!   called, Text frames before that.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::debug;

use crate::adapter::{Adapter, HandshakeRequest, Upgrader};
use crate::error::TransportError;

/// Upper bound on sending the Close frame; a client that stopped reading
/// must not stall teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Adapter ───────────────────────────────────────────────────────────────────

struct ReadState<S> {
    stream: SplitStream<WebSocketStream<S>>,
    pending: Vec<u8>,
    offset: usize,
}

pub struct TungsteniteAdapter<S = TcpStream> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    reader: Mutex<ReadState<S>>,
    request: HandshakeRequest,
    remote_addr: String,
    binary: AtomicBool,
    closed: watch::Sender<bool>,
}

impl<S> TungsteniteAdapter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an established server-side WebSocket.
    pub fn new(ws: WebSocketStream<S>, request: HandshakeRequest) -> Self {
        let remote_addr = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let (sink, stream) = ws.split();
        let (closed, _) = watch::channel(false);

        Self {
            sink: Mutex::new(sink),
            reader: Mutex::new(ReadState {
                stream,
                pending: Vec::new(),
                offset: 0,
            }),
            request,
            remote_addr,
            binary: AtomicBool::new(false),
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(map_ws_error)
    }
}

#[async_trait]
impl<S> Adapter for TungsteniteAdapter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut state = self.reader.lock().await;
        loop {
            if state.offset < state.pending.len() {
                let n = (state.pending.len() - state.offset).min(buf.len());
                let start = state.offset;
                buf[..n].copy_from_slice(&state.pending[start..start + n]);
                state.offset += n;
                if state.offset == state.pending.len() {
                    state.pending.clear();
                    state.offset = 0;
                }
                return Ok(n);
            }

            let next = tokio::select! {
                _ = closed.wait_for(|done| *done) => return Err(TransportError::Closed),
                next = state.stream.next() => next,
            };

            match next {
                None | Some(Ok(Message::Close(_))) => return Ok(0),
                Some(Ok(Message::Binary(data))) => {
                    state.pending = data;
                    state.offset = 0;
                }
                Some(Ok(Message::Text(text))) => {
                    state.pending = text.into_bytes();
                    state.offset = 0;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let message = if self.binary.load(Ordering::Acquire) {
            Message::Binary(data.to_vec())
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|e| {
                TransportError::Protocol(format!("text frame is not valid UTF-8: {e}"))
            })?;
            Message::Text(text)
        };
        self.send(message).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        let graceful = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, graceful).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let e = map_ws_error(e);
                if !e.is_closed() {
                    debug!(client = %self.remote_addr, "sending Close frame failed: {e}");
                }
            }
            Err(_) => debug!(client = %self.remote_addr, "sending Close frame timed out"),
        }
        Ok(())
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }

    async fn set_binary_mode(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.binary.store(true, Ordering::Release);
        Ok(())
    }

    fn request(&self) -> &HandshakeRequest {
        &self.request
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.send(Message::Ping(Vec::new())).await
    }
}

/// Maps tungstenite errors onto the transport taxonomy.
fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Io(e) => TransportError::Io(e),
        other => TransportError::Protocol(other.to_string()),
    }
}

// ── Upgrader ──────────────────────────────────────────────────────────────────

/// Performs the server handshake and captures the request for resolution.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteUpgrader {
    route: Option<String>,
    max_frame_size: Option<usize>,
}

impl TungsteniteUpgrader {
    /// Accepts upgrades on any path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accepts upgrades whose path equals `route`; others get a 404.
    pub fn with_route(route: impl Into<String>) -> Self {
        Self {
            route: Some(route.into()),
            max_frame_size: None,
        }
    }

    /// Rejects incoming frames larger than `bytes` (tungstenite's default
    /// limit applies otherwise).
    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = Some(bytes);
        self
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    fn ws_config(&self) -> Option<WebSocketConfig> {
        self.max_frame_size.map(|bytes| {
            let mut config = WebSocketConfig::default();
            config.max_frame_size = Some(bytes);
            config
        })
    }

    /// Upgrades any async byte stream (used by tests with in-memory pipes).
    pub async fn upgrade_stream<S>(
        &self,
        stream: S,
        remote_addr: Option<SocketAddr>,
    ) -> Result<TungsteniteAdapter<S>, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = oneshot::channel();
        let route = self.route.clone();

        let callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            if let Some(route) = route.as_deref() {
                if req.uri().path() != route {
                    let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
                    *rejection.status_mut() = StatusCode::NOT_FOUND;
                    return Err(rejection);
                }
            }
            let _ = tx.send(HandshakeRequest::new(req.uri().clone(), req.headers().clone()));
            Ok(response)
        };

        let ws = accept_hdr_async_with_config(stream, callback, self.ws_config())
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let mut request = rx.try_recv().map_err(|_| {
            TransportError::Handshake("upgrade request was not captured".to_string())
        })?;
        if let Some(addr) = remote_addr {
            request = request.with_remote_addr(addr);
        }

        Ok(TungsteniteAdapter::new(ws, request))
    }
}

#[async_trait]
impl Upgrader for TungsteniteUpgrader {
    async fn upgrade(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<Box<dyn Adapter>, TransportError> {
        let adapter = self.upgrade_stream(stream, Some(remote_addr)).await?;
        Ok(Box::new(adapter))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
