//! # wsbridge-core
//!
//! Connection-bridging engine that lets browser WebSocket clients (noVNC and
//! similar viewers) talk to TCP-only backends such as VNC servers.  Bytes
//! are relayed unmodified in both directions; nothing here interprets the
//! protocol running on top.
//!
//! # Architecture overview
//!
//! ```text
//!   browser ──WebSocket──▶ Upgrader ──▶ Adapter ──▶ Proxy::serve
//!                                                     │
//!                                 AddressResolver ◀───┤ resolve backend
//!                                                     │
//!                                 Peer::connect ◀─────┤ dial + keepalive
//!                                                     │
//!                                 PeerRegistry ◀──────┘ register, relay, teardown
//! ```
//!
//! - **`adapter`** – the transport seam.  Anything that can read, write and
//!   close a framed client connection is an [`Adapter`]; an [`Upgrader`]
//!   turns a raw TCP connection into one.
//!
//! - **`transport`** – the `tokio-tungstenite` implementation of both traits,
//!   an adapter for sockets upgraded by an `axum` router, and an in-memory
//!   mock.
//!
//! - **`peer`** – one client paired with one backend socket, with the two
//!   relay loops and single-shot teardown.
//!
//! - **`registry`** / **`proxy`** – the set of live peers and the dispatcher
//!   that runs each session through resolve → connect → register → relay →
//!   teardown.
//!
//! - **`resolver`**, **`backend`**, **`logger`**, **`error`** – backend
//!   address policies, TCP dialing, leveled diagnostics and the error
//!   taxonomy.

pub mod adapter;
pub mod backend;
pub mod error;
pub mod logger;
pub mod peer;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod transport;

// Re-export the most-used types at the crate root so callers can write
// `wsbridge_core::Proxy` instead of `wsbridge_core::proxy::Proxy`.
pub use adapter::{Adapter, HandshakeRequest, Upgrader};
pub use error::{BridgeError, Direction, ErrorClass, RelayError, ResolveError, TransportError};
pub use logger::{BridgeLogger, LogLevel, LogSink, TracingSink};
pub use peer::{Peer, PeerId, PeerInfo};
pub use proxy::{Proxy, ProxyConfig};
pub use registry::PeerRegistry;
pub use resolver::{AddressResolver, StaticResolver, TokenResolver};
pub use transport::{AxumAdapter, TungsteniteAdapter, TungsteniteUpgrader};
