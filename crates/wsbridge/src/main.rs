//! wsbridge: WebSocket-to-TCP bridge entry point.
//!
//! Accepts WebSocket connections from browsers (noVNC and similar viewers)
//! and relays their binary frames to TCP backends such as VNC servers.
//!
//! # Why a bridge?
//!
//! Browsers can only speak HTTP/WebSocket; they cannot open raw TCP sockets.
//! VNC servers speak raw TCP.  This process sits in between and copies bytes
//! both ways without looking at them.
//!
//! # Usage
//!
//! ```text
//! wsbridge [OPTIONS]
//!
//! Options:
//!   --listen <IP>                 Listen IP address [default: 0.0.0.0]
//!   --port <PORT>                 Listen port [default: 8080]
//!   --vnc-port <PORT>             Backend on this host (:PORT) [default: 5900]
//!   --target <HOST:PORT>          Backend address (wins over --vnc-port)
//!   --route <PATH>                WebSocket route [default: /websockify]
//!   --token-param <NAME>          Query parameter holding the token [default: token]
//!   --config <FILE>               TOML config file
//!   --dial-timeout-ms <MS>        Backend connect timeout [default: 5000]
//!   --keepalive-secs <SECS>       Client ping interval, 0 disables [default: 10]
//!   --idle-timeout-secs <SECS>    Close idle sessions, 0 disables [default: 0]
//!   --max-peers <N>               Session limit, 0 is unlimited [default: 0]
//!   --log-level <LEVEL>           off | info | debug [default: info]
//! ```
//!
//! # Environment variable overrides
//!
//! Every flag can also be set through `WSBRIDGE_<FLAG>` (for example
//! `WSBRIDGE_PORT=6080`).  Flags take precedence over the environment, and
//! both take precedence over the config file.  `RUST_LOG` overrides the log
//! filter derived from `--log-level`.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wsbridge::application::build_proxy;
use wsbridge::domain::{BridgeConfig, ConfigOverrides, FileConfig};
use wsbridge::infrastructure::run_server;
use wsbridge_core::LogLevel;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket-to-TCP bridge for browser-based VNC viewers.
///
/// Every option is optional; unset options fall back to the config file and
/// then to the built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "wsbridge",
    about = "Relays binary WebSocket sessions to TCP backends",
    version
)]
struct Cli {
    /// IP address to listen on.
    #[arg(long, env = "WSBRIDGE_LISTEN")]
    listen: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "WSBRIDGE_PORT")]
    port: Option<u16>,

    /// Port of a backend on this host; shorthand for `--target :PORT`.
    #[arg(long, env = "WSBRIDGE_VNC_PORT")]
    vnc_port: Option<u16>,

    /// Backend address (`host:port` or `:port`).
    #[arg(long, env = "WSBRIDGE_TARGET")]
    target: Option<String>,

    /// Path on which WebSocket upgrades are accepted.
    #[arg(long, env = "WSBRIDGE_ROUTE")]
    route: Option<String>,

    /// Query parameter carrying the backend token.
    #[arg(long, env = "WSBRIDGE_TOKEN_PARAM")]
    token_param: Option<String>,

    /// TOML configuration file.
    #[arg(long, env = "WSBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend connect timeout in milliseconds.
    #[arg(long, env = "WSBRIDGE_DIAL_TIMEOUT_MS")]
    dial_timeout_ms: Option<u64>,

    /// Seconds between WebSocket pings to each client (0 disables).
    #[arg(long, env = "WSBRIDGE_KEEPALIVE_SECS")]
    keepalive_secs: Option<u64>,

    /// Close sessions idle for this many seconds (0 disables).
    #[arg(long, env = "WSBRIDGE_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: Option<u64>,

    /// Maximum concurrent sessions (0 is unlimited).
    #[arg(long, env = "WSBRIDGE_MAX_PEERS")]
    max_peers: Option<usize>,

    /// Bridge log level: off, info or debug.
    #[arg(long, env = "WSBRIDGE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any) and layers the flags over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if a
    /// value (listen IP, log level, route) is invalid.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let file = match &self.config {
            Some(path) => Some(
                FileConfig::load(path)
                    .with_context(|| format!("loading config file {}", path.display()))?,
            ),
            None => None,
        };

        let overrides = ConfigOverrides {
            listen_host: self.listen,
            port: self.port,
            route: self.route,
            target: self.target,
            vnc_port: self.vnc_port,
            token_param: self.token_param,
            dial_timeout_ms: self.dial_timeout_ms,
            keepalive_secs: self.keepalive_secs,
            idle_timeout_secs: self.idle_timeout_secs,
            max_peers: self.max_peers,
            log_level: self.log_level,
        };

        BridgeConfig::resolve(file, overrides).context("invalid configuration")
    }
}

/// `tracing` filter used when `RUST_LOG` is not set.
fn default_filter(level: LogLevel) -> &'static str {
    if level.debug_enabled() {
        "debug"
    } else if level.info_enabled() {
        "info"
    } else {
        "warn"
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. CLI arguments and the optional config file are merged into a
///    [`BridgeConfig`].
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over
///    `--log-level`.
/// 3. A Ctrl+C handler clears the shared `running` flag.
/// 4. [`run_server`] accepts connections until the flag is cleared, then
///    drains every live session.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_bridge_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(config.log_level))),
        )
        .init();

    if config.uses_tokens() {
        info!(
            "wsbridge starting: listen={}, {} token(s) via '{}'",
            config.listen_addr,
            config.tokens.len(),
            config.token_param
        );
    } else {
        info!(
            "wsbridge starting: listen={}, target={}",
            config.listen_addr, config.target
        );
    }

    let proxy = build_proxy(&config);

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, proxy, running).await?;

    info!("wsbridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
