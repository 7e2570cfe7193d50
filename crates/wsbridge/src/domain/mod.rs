//! Domain layer for wsbridge.
//!
//! Pure configuration types with no networking or async code.  Loading the
//! TOML file is the only I/O here, and it is confined to
//! [`FileConfig::load`].
//!
//! # What belongs in the domain layer?
//!
//! - The resolved [`BridgeConfig`] and its defaults
//! - The configuration layers ([`FileConfig`], [`ConfigOverrides`]) and the
//!   precedence rules that merge them
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or WebSocket types
//! - Command-line parsing (that is done in `main.rs`)

pub mod config;

pub use config::{BridgeConfig, ConfigError, ConfigOverrides, FileConfig};
