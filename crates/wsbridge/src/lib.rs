//! wsbridge library crate.
//!
//! Service wrapper around `wsbridge-core`: it loads configuration, listens
//! for HTTP connections, answers a health check and hands WebSocket upgrades
//! to the proxy, which relays them to TCP backends (typically VNC servers).
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (noVNC, binary WebSocket frames)
//!         ↕
//! [wsbridge]
//!   ├── domain/           BridgeConfig, TOML file layer, CLI overrides
//!   ├── application/      BridgeConfig → Proxy (resolver, limits)
//!   └── infrastructure/
//!         └── server/     axum router, health route, WebSocket route, drain
//!         ↕
//! [wsbridge-core]  Proxy → Peer → TCP backend
//! ```
//!
//! # Layer rules
//!
//! - `domain` depends only on `wsbridge-core`'s plain types (`LogLevel`).
//! - `application` depends on `domain` and `wsbridge-core`.
//! - `infrastructure` depends on all other layers plus `tokio` and `axum`.

/// Domain layer: configuration types and layering rules.
pub mod domain;

/// Application layer: proxy construction from configuration.
pub mod application;

/// Infrastructure layer: listener and connection routing.
pub mod infrastructure;
