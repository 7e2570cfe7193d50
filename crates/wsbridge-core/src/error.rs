//! Error taxonomy for the bridging engine.
//!
//! Errors fall into four classes (see [`ErrorClass`]):
//!
//! | Class           | Raised by                                   | Effect                          |
//! |-----------------|---------------------------------------------|---------------------------------|
//! | `Configuration` | empty / malformed backend address           | nothing allocated, no I/O       |
//! | `Connect`       | dial refused, dial timeout, keepalive setup | session aborted pre-registration|
//! | `Relay`         | mid-session I/O failure                     | peer torn down, reported        |
//! | `ExpectedClose` | the other direction's teardown              | peer torn down, not reported    |
//!
//! Session-setup failures (binary mode, resolution, upgrade, admission) are
//! classified as `Session`.  Nothing is ever retried.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification used by the dispatcher to decide how loudly to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid input detected before any I/O.
    Configuration,
    /// The backend could not be reached or configured.
    Connect,
    /// The session could not be set up (upgrade, binary mode, resolution, admission).
    Session,
    /// An unexpected I/O failure while relaying.
    Relay,
    /// The connection was closed by this peer's own teardown.
    ExpectedClose,
}

// ── Transport errors ──────────────────────────────────────────────────────────

/// Errors raised by an [`Adapter`](crate::adapter::Adapter) or
/// [`Upgrader`](crate::adapter::Upgrader).
///
/// [`TransportError::Closed`] is the distinguished "connection already
/// closed" condition.  Relay code checks it with [`TransportError::is_closed`]
/// instead of matching on error text.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was closed locally (or the close handshake completed).
    #[error("connection closed")]
    Closed,

    /// An underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The upgrade handshake was rejected or failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl TransportError {
    /// Returns `true` for the expected-close condition.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

// ── Address resolution errors ─────────────────────────────────────────────────

/// Errors returned by an [`AddressResolver`](crate::resolver::AddressResolver).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The query parameter carrying the token is absent.
    #[error("missing '{0}' query parameter")]
    MissingToken(String),

    /// The token is not present in the target table.
    #[error("unknown token '{0}'")]
    UnknownToken(String),

    /// A custom policy refused the request.
    #[error("{0}")]
    Rejected(String),
}

// ── Bridge errors ─────────────────────────────────────────────────────────────

/// Errors that abort a session before the relay starts.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The resolution policy produced an empty address.
    #[error("backend address is empty")]
    EmptyAddress,

    /// The address is not in `host:port` or `:port` form.
    #[error("invalid backend address '{0}'")]
    InvalidAddress(String),

    /// The TCP connect failed (refused, unreachable, DNS failure...).
    #[error("cannot connect to backend {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connect did not complete within the dial timeout.
    #[error("connecting to backend {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// Keepalive could not be enabled on the backend socket.
    #[error("enable keepalive on backend {addr} failed: {source}")]
    Keepalive {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The registry already holds the configured maximum number of peers.
    #[error("peer limit of {max} reached")]
    CapacityExceeded { max: usize },

    /// The registry was drained for shutdown and accepts no new peers.
    #[error("proxy is shutting down")]
    ShuttingDown,

    /// The adapter refused to switch to binary framing.
    #[error("failed to set binary mode: {0}")]
    BinaryMode(#[source] TransportError),

    /// The resolution policy refused the request.
    #[error("resolve backend failed: {0}")]
    Resolve(#[from] ResolveError),

    /// The WebSocket upgrade failed.
    #[error("WebSocket upgrade failed: {0}")]
    Upgrade(#[source] TransportError),
}

impl BridgeError {
    /// Maps the error onto the taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            BridgeError::EmptyAddress | BridgeError::InvalidAddress(_) => {
                ErrorClass::Configuration
            }
            BridgeError::Dial { .. }
            | BridgeError::DialTimeout { .. }
            | BridgeError::Keepalive { .. } => ErrorClass::Connect,
            BridgeError::CapacityExceeded { .. }
            | BridgeError::ShuttingDown
            | BridgeError::BinaryMode(_)
            | BridgeError::Resolve(_)
            | BridgeError::Upgrade(_) => ErrorClass::Session,
        }
    }
}

// ── Relay errors ──────────────────────────────────────────────────────────────

/// Which way bytes were flowing when a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client adapter to backend socket.
    SourceToTarget,
    /// Backend socket to client adapter.
    TargetToSource,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::SourceToTarget => f.write_str("source => target"),
            Direction::TargetToSource => f.write_str("target => source"),
        }
    }
}

/// A relay loop failure, annotated with the direction and both endpoints.
#[derive(Debug, Error)]
#[error("copy {direction} ({from} => {to}) failed: {source}")]
pub struct RelayError {
    pub direction: Direction,
    pub from: String,
    pub to: String,
    #[source]
    pub source: TransportError,
}

impl RelayError {
    /// `true` when the relay ended because the connection was closed by
    /// teardown rather than by a real I/O failure.
    pub fn is_expected_close(&self) -> bool {
        self.source.is_closed()
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_expected_close() {
            ErrorClass::ExpectedClose
        } else {
            ErrorClass::Relay
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
