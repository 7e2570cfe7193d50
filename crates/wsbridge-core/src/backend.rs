//! Backend connector: dials and configures the TCP side of a session.
//!
//! One dial attempt per session.  Once connected, TCP keepalive probes run
//! every [`KEEPALIVE_PERIOD`] so a backend that vanished without a FIN is
//! eventually detected even when no bytes are flowing.

use std::io;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::BridgeError;

/// Dial timeout used when the configured value is zero.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle time before the first keepalive probe, and the interval between probes.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Host substituted for the `:port` address form.
const LOCAL_HOST: &str = "127.0.0.1";

/// Validates a resolved backend address and expands the `:port` form.
///
/// # Errors
///
/// [`BridgeError::EmptyAddress`] for blank input and
/// [`BridgeError::InvalidAddress`] when no valid port is present.
pub fn normalize_addr(addr: &str) -> Result<String, BridgeError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(BridgeError::EmptyAddress);
    }

    if let Some(port) = addr.strip_prefix(':') {
        return match port.parse::<u16>() {
            Ok(_) => Ok(format!("{LOCAL_HOST}:{port}")),
            Err(_) => Err(BridgeError::InvalidAddress(addr.to_string())),
        };
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(addr.to_string())
        }
        _ => Err(BridgeError::InvalidAddress(addr.to_string())),
    }
}

/// Returns `timeout`, or [`DEFAULT_DIAL_TIMEOUT`] when it is zero.
pub fn effective_dial_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_DIAL_TIMEOUT
    } else {
        timeout
    }
}

/// Connects to `addr` within `timeout` and enables keepalive.
///
/// # Errors
///
/// - [`BridgeError::EmptyAddress`] / [`BridgeError::InvalidAddress`] before any I/O.
/// - [`BridgeError::Dial`] when the connect fails.
/// - [`BridgeError::DialTimeout`] when the connect does not finish in time.
/// - [`BridgeError::Keepalive`] when socket options cannot be applied.
pub async fn dial(addr: &str, timeout: Duration) -> Result<TcpStream, BridgeError> {
    let addr = normalize_addr(addr)?;
    let timeout = effective_dial_timeout(timeout);

    let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(BridgeError::Dial { addr, source }),
        Err(_) => return Err(BridgeError::DialTimeout { addr, timeout }),
    };

    if let Err(source) = enable_keepalive(&stream) {
        return Err(BridgeError::Keepalive { addr, source });
    }

    debug!(backend = %addr, "backend connected");
    Ok(stream)
}

/// Enables TCP keepalive with [`KEEPALIVE_PERIOD`] and disables Nagle.
pub fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_PERIOD);
    #[cfg(any(target_os = "linux", target_os = "macos", windows))]
    let keepalive = keepalive.with_interval(KEEPALIVE_PERIOD);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    stream.set_nodelay(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
