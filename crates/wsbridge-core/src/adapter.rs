//! Transport abstraction over one bidirectional framed client connection.
//!
//! Relay and registry code depend only on [`Adapter`] and [`Upgrader`]; each
//! WebSocket library gets its own implementation (see [`crate::transport`]).
//!
//! # Blocking and ordering contract
//!
//! Every implementation must behave identically so they are interchangeable
//! behind the dispatcher:
//!
//! - `read` waits until bytes arrive or the stream ends.  `Ok(0)` is a clean
//!   end of stream.  It may return fewer bytes than the buffer holds; bytes
//!   that did not fit are returned by the next call, never dropped.
//! - `write` sends the whole payload or fails.
//! - `close` may be called any number of times from any task.  Only the first
//!   call does work; later calls return `Ok(())`.  A `read` pending on another
//!   task returns [`TransportError::Closed`].
//! - `read` and `write` are called concurrently from two different tasks
//!   (one per relay direction), so all methods take `&self`.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::{HeaderMap, Uri};

use crate::error::TransportError;

// ── Handshake metadata ────────────────────────────────────────────────────────

/// Owned snapshot of the request that established a client connection.
///
/// Only the address-resolution policy consumes it.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl HandshakeRequest {
    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self {
            uri,
            headers,
            remote_addr: None,
        }
    }

    /// Builds a request from a path-and-query string such as
    /// `/websockify?token=abc`.  Unparseable input yields the root URI.
    pub fn from_path(path_and_query: &str) -> Self {
        Self::new(path_and_query.parse().unwrap_or_default(), HeaderMap::new())
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the first value of query parameter `name`.
    ///
    /// A parameter without `=` yields an empty string.  Values are returned
    /// as they appear on the wire (no percent-decoding).
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query()?
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Returns header `name` if it is present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// One client connection, hiding the concrete transport library.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Reads available bytes into `buf`.  `Ok(0)` means end of stream.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Writes all of `data` as one frame.
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Releases the transport.  Idempotent.
    async fn close(&self) -> Result<(), TransportError>;

    /// Textual client address, for diagnostics only.
    fn remote_addr(&self) -> String;

    /// Switches the session to raw binary frames.  Must be called once,
    /// before relaying starts.
    async fn set_binary_mode(&self) -> Result<(), TransportError>;

    /// The request that opened this connection.
    fn request(&self) -> &HandshakeRequest;

    /// Sends a transport-level keepalive.  Transports without one keep the
    /// default no-op.
    async fn ping(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Turns an accepted TCP connection into an [`Adapter`].
///
/// A failed upgrade allocates no session resources.
#[async_trait]
pub trait Upgrader: Send + Sync {
    async fn upgrade(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<Box<dyn Adapter>, TransportError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
