//! [`Adapter`] over an `axum` WebSocket.
//!
//! axum performs the HTTP upgrade inside its router, so there is no
//! [`Upgrader`](crate::adapter::Upgrader) here: a handler extracts the
//! request metadata, calls `WebSocketUpgrade::on_upgrade` and wraps the
//! resulting socket with [`AxumAdapter::new`].
//!
//! ```ignore
//! async fn bridge(
//!     ws: WebSocketUpgrade,
//!     ConnectInfo(remote): ConnectInfo<SocketAddr>,
//!     OriginalUri(uri): OriginalUri,
//!     headers: HeaderMap,
//!     State(proxy): State<Proxy>,
//! ) -> Response {
//!     let request = HandshakeRequest::new(uri, headers).with_remote_addr(remote);
//!     ws.on_upgrade(move |socket| async move {
//!         proxy.serve(Box::new(AxumAdapter::new(socket, request))).await
//!     })
//! }
//! ```
//!
//! Framing follows [`TungsteniteAdapter`](super::TungsteniteAdapter): large
//! frames are split across reads, Text frames are read as bytes, Ping/Pong
//! are consumed and a Close frame ends the stream.

use std::error::Error as StdError;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::adapter::{Adapter, HandshakeRequest};
use crate::error::TransportError;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

struct ReadState {
    stream: SplitStream<WebSocket>,
    pending: Vec<u8>,
    offset: usize,
}

pub struct AxumAdapter {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    reader: Mutex<ReadState>,
    request: HandshakeRequest,
    remote_addr: String,
    binary: AtomicBool,
    /// Set once the client sent Close or the stream ended.
    remote_closed: AtomicBool,
    closed: watch::Sender<bool>,
}

impl AxumAdapter {
    pub fn new(socket: WebSocket, request: HandshakeRequest) -> Self {
        let remote_addr = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let (sink, stream) = socket.split();
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
            remote_closed: AtomicBool::new(false),
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
        sink.send(message).await.map_err(|e| self.map_error(e))
    }

    /// axum boxes the underlying protocol error, so classification relies
    /// on the adapter's own close state plus any I/O error in the chain.
    fn map_error(&self, err: axum::Error) -> TransportError {
        if self.is_closed() || self.remote_closed.load(Ordering::Acquire) {
            return TransportError::Closed;
        }
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                return TransportError::Io(io::Error::new(io_err.kind(), io_err.to_string()));
            }
            source = cause.source();
        }
        TransportError::Protocol(err.to_string())
    }
}

#[async_trait]
impl Adapter for AxumAdapter {
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
                None | Some(Ok(Message::Close(_))) => {
                    self.remote_closed.store(true, Ordering::Release);
                    return Ok(0);
                }
                Some(Ok(Message::Binary(data))) => {
                    state.pending = data;
                    state.offset = 0;
                }
                Some(Ok(Message::Text(text))) => {
                    state.pending = text.into_bytes();
                    state.offset = 0;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => return Err(self.map_error(e)),
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
            // The peer already went away; nothing left to report.
            Ok(Err(_)) if self.remote_closed.load(Ordering::Acquire) => {}
            Ok(Err(e)) => debug!(client = %self.remote_addr, "sending Close frame failed: {e}"),
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

// ── Tests ─────────────────────────────────────────────────────────────────────
