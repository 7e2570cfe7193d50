//! Application layer for wsbridge.
//!
//! Turns a [`BridgeConfig`](crate::domain::BridgeConfig) into a configured
//! [`Proxy`](wsbridge_core::Proxy): which resolution policy to use, the
//! timeouts and the session limits.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - The relay itself (that is `wsbridge-core`)

pub mod bridge_service;

pub use bridge_service::{build_proxy, build_proxy_config, build_resolver};
