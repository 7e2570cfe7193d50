//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled from three layers, highest precedence first:
//!
//! 1. command-line flags / `WSBRIDGE_*` environment variables
//!    ([`ConfigOverrides`], filled in by `main.rs`),
//! 2. an optional TOML file ([`FileConfig`]),
//! 3. the built-in defaults ([`BridgeConfig::default`]).
//!
//! # TOML file format
//!
//! Every key is optional:
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! route = "/websockify"
//! target = "127.0.0.1:5900"
//! token_param = "token"
//! dial_timeout_ms = 5000
//! keepalive_secs = 10        # 0 disables client pings
//! idle_timeout_secs = 0      # 0 disables the idle timeout
//! max_peers = 0              # 0 means unlimited
//! log_level = "info"         # off | info | debug
//!
//! [tokens]
//! desk-01 = "10.0.0.11:5900"
//! desk-02 = "10.0.0.12:5900"
//! ```
//!
//! When `[tokens]` is non-empty, the backend is chosen by the `token` query
//! parameter of the upgrade request and `target` is ignored.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use wsbridge_core::logger::{LogLevel, ParseLogLevelError};

/// Default listen address of the bridge.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// Path on which WebSocket upgrades are accepted.
pub const DEFAULT_ROUTE: &str = "/websockify";
/// Plain-HTTP health check path.
pub const HEALTH_ROUTE: &str = "/ping";
/// Backend dialed when no token table is configured.
pub const DEFAULT_TARGET: &str = ":5900";
/// Query parameter carrying the token.
pub const DEFAULT_TOKEN_PARAM: &str = "token";
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The listen address or host is not a valid IP socket address.
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),

    #[error(transparent)]
    InvalidLogLevel(#[from] ParseLogLevelError),

    /// A route must be an absolute path.
    #[error("route '{0}' must start with '/'")]
    InvalidRoute(String),

    /// The WebSocket route and the health route must differ.
    #[error("route '{0}' is used for both WebSocket and health checks")]
    RouteConflict(String),
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// All runtime configuration for the bridge service.
///
/// # Example
///
/// ```rust
/// use wsbridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 8080);
/// assert_eq!(cfg.route, "/websockify");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub listen_addr: SocketAddr,

    /// Path on which WebSocket upgrades are accepted; other paths get 404.
    pub route: String,

    /// Path answered with a plain `pong`.
    pub health_route: String,

    /// Backend address (`host:port` or `:port`) used without a token table.
    pub target: String,

    /// Token → backend address.  Empty means every session goes to `target`.
    pub tokens: HashMap<String, String>,

    /// Query parameter the token is read from.
    pub token_param: String,

    pub dial_timeout: Duration,

    /// Interval between WebSocket pings to each client; `None` disables.
    pub keepalive_interval: Option<Duration>,

    /// Close sessions with no traffic for this long; `None` disables.
    pub idle_timeout: Option<Duration>,

    /// Maximum concurrent sessions; `None` means unlimited.
    pub max_peers: Option<usize>,

    pub log_level: LogLevel,
}

impl Default for BridgeConfig {
    /// | Field              | Default          |
    /// |--------------------|------------------|
    /// | listen_addr        | `0.0.0.0:8080`   |
    /// | route              | `/websockify`    |
    /// | health_route       | `/ping`          |
    /// | target             | `:5900`          |
    /// | tokens             | empty            |
    /// | dial_timeout       | 5 seconds        |
    /// | keepalive_interval | 10 seconds       |
    /// | idle_timeout       | disabled         |
    /// | max_peers          | unlimited        |
    /// | log_level          | info             |
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            route: DEFAULT_ROUTE.to_string(),
            health_route: HEALTH_ROUTE.to_string(),
            target: DEFAULT_TARGET.to_string(),
            tokens: HashMap::new(),
            token_param: DEFAULT_TOKEN_PARAM.to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            keepalive_interval: Some(DEFAULT_KEEPALIVE),
            idle_timeout: None,
            max_peers: None,
            log_level: LogLevel::INFO,
        }
    }
}

impl BridgeConfig {
    /// Layers `overrides` over `file` over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparsable listen address, host, log
    /// level or route.
    pub fn resolve(
        file: Option<FileConfig>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(file) = file {
            cfg.apply_file(file)?;
        }
        cfg.apply_overrides(overrides)?;

        for route in [&cfg.route, &cfg.health_route] {
            if !route.starts_with('/') {
                return Err(ConfigError::InvalidRoute(route.clone()));
            }
        }
        if cfg.route == cfg.health_route {
            return Err(ConfigError::RouteConflict(cfg.route));
        }
        Ok(cfg)
    }

    /// `true` when backends are selected by token.
    pub fn uses_tokens(&self) -> bool {
        !self.tokens.is_empty()
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(listen) = file.listen {
            self.listen_addr = listen
                .parse()
                .map_err(|_| ConfigError::InvalidListen(listen.clone()))?;
        }
        if let Some(route) = file.route {
            self.route = route;
        }
        if let Some(target) = file.target {
            self.target = target;
        }
        if let Some(param) = file.token_param {
            self.token_param = param;
        }
        if let Some(ms) = file.dial_timeout_ms {
            self.dial_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = file.keepalive_secs {
            self.keepalive_interval = secs_or_disabled(secs);
        }
        if let Some(secs) = file.idle_timeout_secs {
            self.idle_timeout = secs_or_disabled(secs);
        }
        if let Some(max) = file.max_peers {
            self.max_peers = (max > 0).then_some(max);
        }
        if let Some(level) = file.log_level {
            self.log_level = level.parse()?;
        }
        self.tokens.extend(file.tokens);
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(host) = overrides.listen_host {
            let ip: IpAddr = host
                .parse()
                .map_err(|_| ConfigError::InvalidListen(host.clone()))?;
            self.listen_addr.set_ip(ip);
        }
        if let Some(port) = overrides.port {
            self.listen_addr.set_port(port);
        }
        if let Some(route) = overrides.route {
            self.route = route;
        }
        match (overrides.target, overrides.vnc_port) {
            (Some(target), _) => self.target = target,
            (None, Some(port)) => self.target = format!(":{port}"),
            (None, None) => {}
        }
        if let Some(param) = overrides.token_param {
            self.token_param = param;
        }
        if let Some(ms) = overrides.dial_timeout_ms {
            self.dial_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = overrides.keepalive_secs {
            self.keepalive_interval = secs_or_disabled(secs);
        }
        if let Some(secs) = overrides.idle_timeout_secs {
            self.idle_timeout = secs_or_disabled(secs);
        }
        if let Some(max) = overrides.max_peers {
            self.max_peers = (max > 0).then_some(max);
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level.parse()?;
        }
        Ok(())
    }
}

fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

// ── Layers ────────────────────────────────────────────────────────────────────

/// Contents of the optional TOML config file.  Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub route: Option<String>,
    pub target: Option<String>,
    pub token_param: Option<String>,
    pub dial_timeout_ms: Option<u64>,
    pub keepalive_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_peers: Option<usize>,
    pub log_level: Option<String>,
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl FileConfig {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read (including "not
    /// found": an explicitly named file must exist), [`ConfigError::Parse`]
    /// for malformed TOML or unknown keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// IP address part of the listen address.
    pub listen_host: Option<String>,
    /// Port part of the listen address.
    pub port: Option<u16>,
    pub route: Option<String>,
    /// Full backend address; wins over `vnc_port`.
    pub target: Option<String>,
    /// Shorthand for a backend on this host (`:PORT`).
    pub vnc_port: Option<u16>,
    pub token_param: Option<String>,
    pub dial_timeout_ms: Option<u64>,
    pub keepalive_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_peers: Option<usize>,
    pub log_level: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
