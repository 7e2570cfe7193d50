//! A bridged session: one client [`Adapter`] paired with one backend socket.
//!
//! # Relay directions
//!
//! ```text
//!   client ──Adapter::read──▶ relay_source_to_target ──write_all──▶ backend
//!   client ◀─Adapter::write── relay_target_to_source ◀──read─────── backend
//! ```
//!
//! Each direction owns one half of the backend socket, so the two loops
//! never contend for a lock.  Teardown takes both halves out of the peer
//! and drops them, which closes the backend connection even while other
//! tasks still hold an `Arc<Peer>`.  Both loops race every read and write against
//! the peer's shutdown signal; [`Peer::close`] flips it, which is the only
//! cancellation mechanism.
//!
//! # Teardown
//!
//! Teardown may be requested by either relay task, the watchdog, or a
//! registry drain, in any order.  A single atomic flag makes it single-shot:
//! exactly one caller wins [`Peer::begin_teardown`] and performs the release.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::adapter::Adapter;
use crate::backend;
use crate::error::{BridgeError, Direction, RelayError, TransportError};

/// Size of the copy buffer used by each relay direction.
pub const RELAY_BUFFER_SIZE: usize = 32 * 1024;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Registry key of a [`Peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new() -> Self {
        PeerId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Point-in-time description of a peer, returned by registry snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub source_addr: String,
    pub target_addr: String,
    pub uptime: Duration,
    pub bytes_to_target: u64,
    pub bytes_to_source: u64,
}

// ── Peer ──────────────────────────────────────────────────────────────────────

pub struct Peer {
    id: PeerId,
    source: Arc<dyn Adapter>,
    source_addr: String,
    target_reader: Mutex<Option<OwnedReadHalf>>,
    target_writer: Mutex<Option<OwnedWriteHalf>>,
    target_addr: String,
    connected_at: Instant,
    /// Milliseconds after `connected_at` at which bytes last moved.
    last_activity_ms: AtomicU64,
    bytes_to_target: AtomicU64,
    bytes_to_source: AtomicU64,
    torn_down: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Peer {
    /// Dials `addr` and pairs the resulting socket with `source`.
    ///
    /// Either both sides are valid and a peer is returned, or nothing is
    /// constructed.  A zero `dial_timeout` falls back to
    /// [`backend::DEFAULT_DIAL_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Configuration errors for an empty or malformed address, connect
    /// errors when the backend is unreachable or keepalive setup fails.
    pub async fn connect(
        source: Arc<dyn Adapter>,
        addr: &str,
        dial_timeout: Duration,
    ) -> Result<Arc<Self>, BridgeError> {
        let stream = backend::dial(addr, dial_timeout).await?;
        Ok(Arc::new(Self::from_stream(source, stream)))
    }

    /// Pairs `source` with an already-connected backend socket.
    pub fn from_stream(source: Arc<dyn Adapter>, stream: TcpStream) -> Self {
        let target_addr = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let source_addr = source.remote_addr();
        let (reader, writer) = stream.into_split();
        let (shutdown, _) = watch::channel(false);

        Self {
            id: PeerId::new(),
            source,
            source_addr,
            target_reader: Mutex::new(Some(reader)),
            target_writer: Mutex::new(Some(writer)),
            target_addr,
            connected_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            bytes_to_target: AtomicU64::new(0),
            bytes_to_source: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn source(&self) -> &Arc<dyn Adapter> {
        &self.source
    }

    pub fn source_addr(&self) -> &str {
        &self.source_addr
    }

    pub fn target_addr(&self) -> &str {
        &self.target_addr
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            source_addr: self.source_addr.clone(),
            target_addr: self.target_addr.clone(),
            uptime: self.connected_at.elapsed(),
            bytes_to_target: self.bytes_to_target.load(Ordering::Relaxed),
            bytes_to_source: self.bytes_to_source.load(Ordering::Relaxed),
        }
    }

    /// Time since bytes last moved in either direction.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.connected_at.elapsed().saturating_sub(last)
    }

    /// `true` once teardown has started.
    pub fn is_closed(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Resolves once teardown has started.
    pub async fn closed(&self) {
        let mut shutdown = self.shutdown.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = shutdown.wait_for(|done| *done).await;
    }

    // ── Relay ─────────────────────────────────────────────────────────────────

    /// Copies client bytes to the backend until the client ends its stream.
    ///
    /// On a clean end of stream the backend write half is shut down so the
    /// backend sees EOF after exactly the bytes the client sent.
    ///
    /// # Errors
    ///
    /// [`RelayError`] carrying [`TransportError::Closed`] when the peer was
    /// torn down, or the underlying failure otherwise.
    pub async fn relay_source_to_target(&self) -> Result<u64, RelayError> {
        let mut shutdown = self.shutdown.subscribe();
        let mut guard = self.target_writer.lock().await;
        let Some(target) = guard.as_mut() else {
            return Err(self.relay_error(Direction::SourceToTarget, TransportError::Closed));
        };
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        let mut total = 0u64;

        let outcome = loop {
            let n = tokio::select! {
                _ = shutdown.wait_for(|done| *done) => break Err(TransportError::Closed),
                read = self.source.read(&mut buf) => match read {
                    Ok(n) => n,
                    Err(e) => break Err(e),
                },
            };
            if n == 0 {
                break Ok(total);
            }

            tokio::select! {
                _ = shutdown.wait_for(|done| *done) => break Err(TransportError::Closed),
                written = target.write_all(&buf[..n]) => {
                    if let Err(e) = written {
                        break Err(TransportError::Io(e));
                    }
                }
            }

            total += n as u64;
            self.bytes_to_target.fetch_add(n as u64, Ordering::Relaxed);
            self.touch();
        };

        if outcome.is_ok() {
            if let Err(e) = target.shutdown().await {
                debug!(peer = %self.id, "backend half-close failed: {e}");
            }
        }

        outcome.map_err(|source| self.relay_error(Direction::SourceToTarget, source))
    }

    /// Copies backend bytes to the client until the backend closes.
    ///
    /// # Errors
    ///
    /// Same classification as [`Peer::relay_source_to_target`].
    pub async fn relay_target_to_source(&self) -> Result<u64, RelayError> {
        let mut shutdown = self.shutdown.subscribe();
        let mut guard = self.target_reader.lock().await;
        let Some(target) = guard.as_mut() else {
            return Err(self.relay_error(Direction::TargetToSource, TransportError::Closed));
        };
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        let mut total = 0u64;

        let outcome = loop {
            let n = tokio::select! {
                _ = shutdown.wait_for(|done| *done) => break Err(TransportError::Closed),
                read = target.read(&mut buf) => match read {
                    Ok(n) => n,
                    Err(e) => break Err(TransportError::Io(e)),
                },
            };
            if n == 0 {
                break Ok(total);
            }

            tokio::select! {
                _ = shutdown.wait_for(|done| *done) => break Err(TransportError::Closed),
                written = self.source.write(&buf[..n]) => {
                    if let Err(e) = written {
                        break Err(e);
                    }
                }
            }

            total += n as u64;
            self.bytes_to_source.fetch_add(n as u64, Ordering::Relaxed);
            self.touch();
        };

        outcome.map_err(|source| self.relay_error(Direction::TargetToSource, source))
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Claims the teardown.  Returns `true` for exactly one caller.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    /// Stops both relay loops, closes the backend socket, then closes the
    /// client side.
    pub async fn release(&self) {
        self.shutdown.send_replace(true);

        // Every await in the relay loops races the shutdown signal, so both
        // locks are free again shortly after the flip.
        let writer = self.target_writer.lock().await.take();
        let reader = self.target_reader.lock().await.take();
        drop(writer);
        drop(reader);

        if let Err(e) = self.source.close().await {
            debug!(peer = %self.id, "closing client side failed: {e}");
        }
    }

    /// Closes both sides.  Safe to call from any task, any number of times;
    /// returns `true` only for the call that performed the close.
    pub async fn close(&self) -> bool {
        if !self.begin_teardown() {
            return false;
        }
        self.release().await;
        true
    }

    fn touch(&self) {
        let now = self.connected_at.elapsed().as_millis() as u64;
        self.last_activity_ms.store(now, Ordering::Relaxed);
    }

    fn relay_error(&self, direction: Direction, source: TransportError) -> RelayError {
        let (from, to) = match direction {
            Direction::SourceToTarget => (&self.source_addr, &self.target_addr),
            Direction::TargetToSource => (&self.target_addr, &self.source_addr),
        };
        RelayError {
            direction,
            from: from.clone(),
            to: to.clone(),
            source,
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("source_addr", &self.source_addr)
            .field("target_addr", &self.target_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
