//! Concrete [`Adapter`](crate::adapter::Adapter) implementations.
//!
//! - [`tungstenite`] – WebSocket transport on `tokio-tungstenite`, with an
//!   [`Upgrader`](crate::adapter::Upgrader) for raw TCP connections.
//! - [`axum_ws`] – adapter over a socket upgraded by an `axum` router.
//! - [`mock`] – in-memory adapter for tests and embedders that drive a
//!   session without a network.
//!
//! `tests/transport_contract.rs` runs the same behavioural checks against
//! both network transports.

pub mod axum_ws;
pub mod mock;
pub mod tungstenite;

pub use self::axum_ws::AxumAdapter;
pub use self::tungstenite::{TungsteniteAdapter, TungsteniteUpgrader};
