//! HTTP/WebSocket front end.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Routing requests through an `axum` [`Router`]:
//!    - the health route answers `pong`,
//!    - the WebSocket route upgrades the connection and hands the socket to
//!      [`Proxy::serve`] through an [`AxumAdapter`],
//!    - every other path gets axum's 404.
//! 3. Polling the shutdown flag every 200 ms.  Once it is cleared the proxy
//!    is drained, so every live session is torn down before `run_server`
//!    returns.
//!
//! axum runs each connection on its own task; the accept loop never waits
//! on a session.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::{ConnectInfo, OriginalUri, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use wsbridge_core::{AxumAdapter, HandshakeRequest, Proxy};

use crate::domain::config::BridgeConfig;

/// How often the shutdown flag is re-checked.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.listen_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, missing
/// permission) or the HTTP server fails.
pub async fn run_server(
    config: BridgeConfig,
    proxy: Proxy,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(
        "wsbridge listening on {} (WebSocket route {}, health route {})",
        config.listen_addr, config.route, config.health_route
    );

    serve_listener(listener, Arc::new(config), proxy, running).await
}

/// Serves an already-bound listener.  Returns after the shutdown flag is
/// cleared and the proxy has been drained.
///
/// # Errors
///
/// Returns an error if the HTTP server fails.
pub async fn serve_listener(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    proxy: Proxy,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let app = build_router(&config, proxy.clone());

    let drained = async move {
        while running.load(Ordering::Relaxed) {
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        info!("shutdown flag set; draining sessions");
        proxy.shutdown().await;
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(drained)
    .await
    .context("HTTP server failed")
}

/// Health route plus the WebSocket route; everything else is a 404.
pub fn build_router(config: &BridgeConfig, proxy: Proxy) -> Router {
    Router::new()
        .route(&config.health_route, get(health))
        .route(&config.route, get(bridge))
        .layer(TraceLayer::new_for_http())
        .with_state(proxy)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "pong"
}

async fn bridge(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    State(proxy): State<Proxy>,
) -> Response {
    debug!("upgrade request from {remote} for {uri}");
    let request = HandshakeRequest::new(uri, headers).with_remote_addr(remote);
    ws.on_upgrade(move |socket| async move {
        proxy.serve(Box::new(AxumAdapter::new(socket, request))).await;
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
