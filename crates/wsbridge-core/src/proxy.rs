//! Session dispatcher.
//!
//! [`Proxy::serve`] runs one client session from start to end:
//!
//! 1. switch the adapter to binary framing,
//! 2. resolve the backend address from the handshake request,
//! 3. refuse early if the proxy is full or shutting down,
//! 4. dial the backend and build the [`Peer`],
//! 5. register it,
//! 6. spawn the backend→client relay and the watchdog,
//! 7. relay client→backend on the calling task,
//! 8. tear the peer down.
//!
//! Steps 1–5 abort the session on error before anything is registered.
//! Whichever relay finishes first tears the peer down; the registry makes
//! that single-shot, so the other relay only observes an expected close.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::adapter::{Adapter, Upgrader};
use crate::backend::DEFAULT_DIAL_TIMEOUT;
use crate::error::{BridgeError, RelayError};
use crate::logger::{BridgeLogger, LogLevel, LogSink};
use crate::peer::{Peer, PeerInfo};
use crate::registry::PeerRegistry;
use crate::resolver::{AddressResolver, StaticResolver};
use crate::transport::TungsteniteUpgrader;

/// Default interval between WebSocket pings sent to each client.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Lower bound on how often the idle watchdog looks at a peer.
const MIN_IDLE_CHECK: Duration = Duration::from_millis(10);

// ── Configuration ─────────────────────────────────────────────────────────────

/// Settings for a [`Proxy`].  Fixed once the proxy is built.
#[derive(Clone)]
pub struct ProxyConfig {
    pub log_level: LogLevel,
    /// Custom destination for diagnostics; `None` logs through `tracing`.
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// Backend connect timeout.  Zero means [`DEFAULT_DIAL_TIMEOUT`].
    pub dial_timeout: Duration,
    /// Backend resolution policy; `None` always dials `:5901`.
    pub resolver: Option<Arc<dyn AddressResolver>>,
    /// Upgrader used by [`Proxy::serve_stream`]; `None` uses
    /// [`TungsteniteUpgrader`] on any path.
    pub upgrader: Option<Arc<dyn Upgrader>>,
    /// Interval between client pings; `None` disables them.
    pub keepalive_interval: Option<Duration>,
    /// Tear a peer down after this long without traffic in either direction.
    pub idle_timeout: Option<Duration>,
    /// Maximum number of concurrently registered peers.
    pub max_peers: Option<usize>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_sink: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            resolver: None,
            upgrader: None,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            idle_timeout: None,
            max_peers: None,
        }
    }
}

impl ProxyConfig {
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_upgrader(mut self, upgrader: impl Upgrader + 'static) -> Self {
        self.upgrader = Some(Arc::new(upgrader));
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_peers(mut self, max: Option<usize>) -> Self {
        self.max_peers = max;
        self
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("log_level", &self.log_level)
            .field("custom_sink", &self.log_sink.is_some())
            .field("dial_timeout", &self.dial_timeout)
            .field("custom_resolver", &self.resolver.is_some())
            .field("custom_upgrader", &self.upgrader.is_some())
            .field("keepalive_interval", &self.keepalive_interval)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_peers", &self.max_peers)
            .finish()
    }
}

// ── Proxy ─────────────────────────────────────────────────────────────────────

/// Bridges WebSocket clients to TCP backends.  Cloning yields another handle
/// to the same registry.
#[derive(Clone)]
pub struct Proxy {
    logger: BridgeLogger,
    registry: PeerRegistry,
    resolver: Arc<dyn AddressResolver>,
    upgrader: Arc<dyn Upgrader>,
    dial_timeout: Duration,
    keepalive_interval: Option<Duration>,
    idle_timeout: Option<Duration>,
    max_peers: Option<usize>,
}

impl Proxy {
    pub fn new(config: ProxyConfig) -> Self {
        let resolver = config
            .resolver
            .unwrap_or_else(|| Arc::new(StaticResolver::default()));
        let upgrader = config
            .upgrader
            .unwrap_or_else(|| Arc::new(TungsteniteUpgrader::new()));

        Self {
            logger: BridgeLogger::new(config.log_level, config.log_sink),
            registry: PeerRegistry::new(),
            resolver,
            upgrader,
            dial_timeout: config.dial_timeout,
            keepalive_interval: config.keepalive_interval.filter(|d| !d.is_zero()),
            idle_timeout: config.idle_timeout.filter(|d| !d.is_zero()),
            max_peers: config.max_peers,
        }
    }

    pub fn logger(&self) -> &BridgeLogger {
        &self.logger
    }

    /// Upgrades a raw TCP connection with the configured upgrader, then
    /// serves the session.  Upgrade failures are logged and end the call.
    pub async fn serve_stream(&self, stream: TcpStream, remote_addr: SocketAddr) {
        match self.upgrader.upgrade(stream, remote_addr).await {
            Ok(adapter) => self.serve(adapter).await,
            Err(e) => self.logger.info(BridgeError::Upgrade(e)),
        }
    }

    /// Runs one session to completion.  Returns once the peer is torn down
    /// or the session was refused.
    pub async fn serve(&self, adapter: Box<dyn Adapter>) {
        let adapter: Arc<dyn Adapter> = Arc::from(adapter);
        self.logger
            .debug(format_args!("serving client {}", adapter.remote_addr()));

        let peer = match self.open_session(Arc::clone(&adapter)).await {
            Ok(peer) => peer,
            Err(e) => {
                self.logger.info(format_args!(
                    "session from {} refused: {e}",
                    adapter.remote_addr()
                ));
                if let Err(e) = adapter.close().await {
                    self.logger.debug(format_args!("closing refused client failed: {e}"));
                }
                return;
            }
        };
        self.logger.info(format_args!(
            "peer {} connected: {} => {}",
            peer.id(),
            peer.source_addr(),
            peer.target_addr()
        ));

        let reverse = tokio::spawn({
            let proxy = self.clone();
            let peer = Arc::clone(&peer);
            async move {
                let result = peer.relay_target_to_source().await;
                proxy.report_relay(result);
                proxy.finish(&peer).await;
            }
        });

        if self.keepalive_interval.is_some() || self.idle_timeout.is_some() {
            tokio::spawn({
                let proxy = self.clone();
                let peer = Arc::clone(&peer);
                async move { proxy.watch_peer(peer).await }
            });
        }

        let result = peer.relay_source_to_target().await;
        self.report_relay(result);
        self.finish(&peer).await;

        // Joined only so that the close is fully reported when `serve`
        // returns; teardown above already unblocked the task.
        if let Err(e) = reverse.await {
            self.logger.debug(format_args!("backend relay task ended abnormally: {e}"));
        }
    }

    /// Point-in-time view of the registered peers.
    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.registry.snapshot().await
    }

    pub async fn peer_count(&self) -> usize {
        self.registry.len().await
    }

    /// Refuses new sessions and tears down every active one.  Returns the
    /// number of peers closed.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.drain().await;
        self.logger
            .info(format_args!("proxy shut down, closed {closed} peer(s)"));
        closed
    }

    // ── Session steps ─────────────────────────────────────────────────────────

    async fn open_session(&self, adapter: Arc<dyn Adapter>) -> Result<Arc<Peer>, BridgeError> {
        adapter
            .set_binary_mode()
            .await
            .map_err(BridgeError::BinaryMode)?;

        let addr = {
            let request = adapter.request();
            self.logger.debug(format_args!("request url: {}", request.uri()));
            self.resolver.resolve(request)?
        };
        self.logger.debug(format_args!("resolved backend {addr}"));

        self.registry.check_admission(self.max_peers).await?;

        let peer = Peer::connect(adapter, &addr, self.dial_timeout).await?;
        if let Err(e) = self
            .registry
            .try_insert(Arc::clone(&peer), self.max_peers)
            .await
        {
            peer.close().await;
            return Err(e);
        }
        Ok(peer)
    }

    /// Tears `peer` down; only the winning caller logs the close.
    async fn finish(&self, peer: &Peer) {
        if self.registry.teardown(peer).await {
            let info = peer.info();
            self.logger.info(format_args!(
                "close peer {} after {:?} ({} bytes to target, {} bytes to source)",
                info.id, info.uptime, info.bytes_to_target, info.bytes_to_source
            ));
        }
    }

    fn report_relay(&self, result: Result<u64, RelayError>) {
        match result {
            Ok(bytes) => self.logger.debug(format_args!("relay finished after {bytes} bytes")),
            Err(e) if e.is_expected_close() => self.logger.debug(e),
            Err(e) => self.logger.info(e),
        }
    }

    /// Pings the client and enforces the idle timeout until the peer closes.
    async fn watch_peer(&self, peer: Arc<Peer>) {
        let mut ping = self.keepalive_interval.map(delayed_interval);
        let mut idle_check = self
            .idle_timeout
            .map(|limit| delayed_interval((limit / 4).max(MIN_IDLE_CHECK)));

        loop {
            tokio::select! {
                _ = peer.closed() => return,
                _ = next_tick(&mut ping) => {
                    let pinged = tokio::select! {
                        _ = peer.closed() => return,
                        pinged = peer.source().ping() => pinged,
                    };
                    if let Err(e) = pinged {
                        if e.is_closed() {
                            return;
                        }
                        self.logger.info(format_args!(
                            "keepalive ping to {} failed: {e}",
                            peer.source_addr()
                        ));
                        self.finish(&peer).await;
                        return;
                    }
                }
                _ = next_tick(&mut idle_check) => {
                    let limit = self.idle_timeout.unwrap_or(Duration::MAX);
                    let idle = peer.idle_for();
                    if idle >= limit {
                        self.logger.info(format_args!(
                            "peer {} idle for {idle:?}, closing",
                            peer.id()
                        ));
                        self.finish(&peer).await;
                        return;
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("logger", &self.logger)
            .field("dial_timeout", &self.dial_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_peers", &self.max_peers)
            .finish()
    }
}

/// An interval whose first tick is one `period` from now.
fn delayed_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Ticks `interval`, or never resolves when it is disabled.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::HandshakeRequest;
    use crate::error::ResolveError;
    use crate::transport::mock::{MockAdapter, MockClient};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingSink {
        fn infos(&self) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(level, _)| *level == "info")
                .map(|(_, line)| line.clone())
                .collect()
        }

        fn debugs(&self) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(level, _)| *level == "debug")
                .map(|(_, line)| line.clone())
                .collect()
        }
    }

    impl LogSink for RecordingSink {
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(("info", message.to_string()));
        }

        fn debug(&self, message: &str) {
            self.lines.lock().unwrap().push(("debug", message.to_string()));
        }
    }

    /// Backend that echoes everything back until the peer closes.
    async fn spawn_echo_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    fn proxy_to(addr: &str) -> ProxyConfig {
        ProxyConfig::default()
            .with_resolver(StaticResolver::new(addr))
            .with_keepalive_interval(None)
    }

    fn start(proxy: &Proxy, path: &str) -> (MockClient, JoinHandle<()>) {
        let (adapter, client) = MockAdapter::new(HandshakeRequest::from_path(path));
        let proxy = proxy.clone();
        let task = tokio::spawn(async move { proxy.serve(Box::new(adapter)).await });
        (client, task)
    }

    async fn wait_for_peers(proxy: &Proxy, count: usize) {
        timeout(WAIT, async {
            while proxy.peer_count().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never reached the expected size");
    }

    #[tokio::test]
    async fn test_echo_round_trip_through_proxy() {
        // Arrange
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(proxy_to(&backend));
        let (client, task) = start(&proxy, "/websockify");

        // Act
        client.send(vec![0x01, 0x02, 0x03]);
        let echoed = client.wait_received(3, WAIT).await;

        // Assert
        assert_eq!(echoed, Some(vec![0x01, 0x02, 0x03]));
        assert!(client.binary_mode());

        client.finish();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(proxy.peer_count().await, 0);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_peer_is_registered_only_while_active() {
        // Arrange
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(proxy_to(&backend));
        assert_eq!(proxy.peer_count().await, 0);

        // Act
        let (client, task) = start(&proxy, "/websockify");
        wait_for_peers(&proxy, 1).await;

        // Assert
        let peers = proxy.peers().await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].source_addr, "mock-client");
        assert_eq!(peers[0].target_addr, backend);

        client.finish();
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(proxy.peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_failure_dials_nothing() {
        // Arrange: a listener that must never see a connection
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sink = Arc::new(RecordingSink::default());
        let resolver = |_: &HandshakeRequest| -> Result<String, ResolveError> {
            Err(ResolveError::Rejected("no such desktop".to_string()))
        };
        let proxy = Proxy::new(
            ProxyConfig::default()
                .with_resolver(resolver)
                .with_log_sink(sink.clone()),
        );
        let (client, task) = start(&proxy, "/websockify?token=bogus");

        // Act
        timeout(WAIT, task).await.unwrap().unwrap();

        // Assert
        assert_eq!(proxy.peer_count().await, 0);
        assert!(client.is_closed());
        let accepted = timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(accepted.is_err(), "no backend connection may be attempted");
        assert!(sink.infos().iter().any(|line| line.contains("no such desktop")));
    }

    #[tokio::test]
    async fn test_binary_mode_failure_aborts_session() {
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(proxy_to(&backend));
        let (adapter, client) = MockAdapter::new(HandshakeRequest::default());

        timeout(WAIT, proxy.serve(Box::new(adapter.failing_binary_mode())))
            .await
            .unwrap();

        assert_eq!(proxy.peer_count().await, 0);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_unreachable_backend_registers_nothing() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let proxy = Proxy::new(proxy_to(&addr).with_dial_timeout(Duration::from_millis(500)));
        let (client, task) = start(&proxy, "/websockify");

        timeout(WAIT, task).await.unwrap().unwrap();

        assert_eq!(proxy.peer_count().await, 0);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_backend_close_ends_session() {
        // Arrange: backend writes a greeting then hangs up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"RFB 003.008\n").await.unwrap();
        });
        let proxy = Proxy::new(proxy_to(&addr));

        // Act
        let (client, task) = start(&proxy, "/websockify");

        // Assert: the client got the bytes and the whole session ended
        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(client.received(), b"RFB 003.008\n");
        assert!(client.is_closed());
        assert_eq!(client.close_calls(), 1);
        assert_eq!(proxy.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_expected_close_is_not_reported_at_info() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let sink = Arc::new(RecordingSink::default());
        let proxy = Proxy::new(
            proxy_to(&addr)
                .with_log_level(LogLevel::DEBUG)
                .with_log_sink(sink.clone()),
        );

        // Act
        let (_client, task) = start(&proxy, "/websockify");
        timeout(WAIT, task).await.unwrap().unwrap();

        // Assert: the forward relay saw the teardown, logged only at debug
        assert!(
            sink.infos().iter().all(|line| !line.contains("failed")),
            "info lines: {:?}",
            sink.infos()
        );
        assert!(sink
            .debugs()
            .iter()
            .any(|line| line.contains("source => target") && line.contains("connection closed")));
        assert_eq!(
            sink.infos().iter().filter(|l| l.contains("close peer")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_relay_failure_is_reported_at_info() {
        let backend = spawn_echo_backend().await;
        let sink = Arc::new(RecordingSink::default());
        let proxy = Proxy::new(proxy_to(&backend).with_log_sink(sink.clone()));
        let (client, task) = start(&proxy, "/websockify");
        wait_for_peers(&proxy, 1).await;

        client.send_error(std::io::ErrorKind::ConnectionReset);
        timeout(WAIT, task).await.unwrap().unwrap();

        assert!(sink
            .infos()
            .iter()
            .any(|line| line.starts_with("[wsbridge] copy source => target")));
        assert_eq!(proxy.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_limit_refuses_extra_session() {
        // Arrange
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(proxy_to(&backend).with_max_peers(Some(1)));
        let (first, first_task) = start(&proxy, "/websockify");
        wait_for_peers(&proxy, 1).await;

        // Act
        let (second, second_task) = start(&proxy, "/websockify");
        timeout(WAIT, second_task).await.unwrap().unwrap();

        // Assert
        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert_eq!(proxy.peer_count().await, 1);

        first.finish();
        timeout(WAIT, first_task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_active_sessions() {
        // Arrange
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(proxy_to(&backend));
        let (a, task_a) = start(&proxy, "/websockify");
        let (b, task_b) = start(&proxy, "/websockify");
        wait_for_peers(&proxy, 2).await;

        // Act
        let closed = proxy.shutdown().await;

        // Assert
        assert_eq!(closed, 2);
        timeout(WAIT, task_a).await.unwrap().unwrap();
        timeout(WAIT, task_b).await.unwrap().unwrap();
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(a.close_calls(), 1);

        let (late, late_task) = start(&proxy, "/websockify");
        timeout(WAIT, late_task).await.unwrap().unwrap();
        assert!(late.is_closed());
        assert_eq!(proxy.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_keepalive_pings_client_and_failed_ping_ends_session() {
        // Arrange
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(
            proxy_to(&backend).with_keepalive_interval(Some(Duration::from_millis(30))),
        );
        let (client, task) = start(&proxy, "/websockify");
        wait_for_peers(&proxy, 1).await;

        // Act
        tokio::time::sleep(Duration::from_millis(100)).await;
        let pings = client.ping_count();
        client.fail_pings();

        // Assert
        assert!(pings >= 1, "expected keepalive pings, got {pings}");
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(client.is_closed());
        assert_eq!(proxy.peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_backend_closed_after_teardown_even_when_ping_stalls() {
        // Arrange: a backend that reports when its connection ends
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (ended_tx, ended_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = ended_tx.send(());
        });
        let proxy = Proxy::new(
            proxy_to(&addr).with_keepalive_interval(Some(Duration::from_millis(30))),
        );
        let (client, task) = start(&proxy, "/websockify");
        client.stall_pings();
        timeout(WAIT, async {
            while client.ping_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watchdog never pinged");

        // Act: the client side fails while the watchdog is parked in a ping
        client.send_error(std::io::ErrorKind::ConnectionReset);
        timeout(WAIT, task).await.unwrap().unwrap();

        // Assert
        assert_eq!(proxy.peer_count().await, 0);
        timeout(WAIT, ended_rx)
            .await
            .expect("backend connection still open after teardown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_quiet_peer() {
        let backend = spawn_echo_backend().await;
        let proxy = Proxy::new(
            proxy_to(&backend).with_idle_timeout(Some(Duration::from_millis(100))),
        );
        let (client, task) = start(&proxy, "/websockify");

        timeout(WAIT, task).await.unwrap().unwrap();

        assert!(client.is_closed());
        assert_eq!(proxy.peer_count().await, 0);
    }

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.keepalive_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.max_peers, None);
        assert_eq!(config.log_level, LogLevel::INFO);
        assert!(config.resolver.is_none());
    }
}
