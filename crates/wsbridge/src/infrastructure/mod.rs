//! Infrastructure layer for wsbridge.
//!
//! Handles all I/O owned by the service itself: binding the listener,
//! routing HTTP requests with axum, answering the health check and handing
//! upgraded WebSocket sockets to the proxy.  The relay and the WebSocket framing live in `wsbridge-core`.
//!
//! # What does NOT belong here?
//!
//! - Configuration merging (that is the domain layer)
//! - Proxy wiring (that is the application layer)

pub mod server;

pub use server::{build_router, run_server, serve_listener};
