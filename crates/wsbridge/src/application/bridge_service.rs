//! Wiring from [`BridgeConfig`] to a [`Proxy`].

use std::sync::Arc;

use wsbridge_core::{AddressResolver, Proxy, ProxyConfig, StaticResolver, TokenResolver};

use crate::domain::BridgeConfig;

/// Picks the resolution policy: the token table when one is configured,
/// otherwise the fixed `target`.
pub fn build_resolver(config: &BridgeConfig) -> Arc<dyn AddressResolver> {
    if config.uses_tokens() {
        Arc::new(TokenResolver::new(config.tokens.clone()).with_param(config.token_param.as_str()))
    } else {
        Arc::new(StaticResolver::new(config.target.as_str()))
    }
}

pub fn build_proxy_config(config: &BridgeConfig) -> ProxyConfig {
    let mut proxy_config = ProxyConfig::default()
        .with_log_level(config.log_level)
        .with_dial_timeout(config.dial_timeout)
        .with_keepalive_interval(config.keepalive_interval)
        .with_idle_timeout(config.idle_timeout)
        .with_max_peers(config.max_peers);
    proxy_config.resolver = Some(build_resolver(config));
    proxy_config
}

pub fn build_proxy(config: &BridgeConfig) -> Proxy {
    Proxy::new(build_proxy_config(config))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wsbridge_core::{HandshakeRequest, ResolveError};

    #[test]
    fn test_static_resolver_without_tokens() {
        // Arrange
        let config = BridgeConfig {
            target: "10.0.0.5:5900".to_string(),
            ..Default::default()
        };

        // Act
        let resolver = build_resolver(&config);

        // Assert: the request does not matter
        let req = HandshakeRequest::from_path("/websockify?token=desk-01");
        assert_eq!(resolver.resolve(&req).unwrap(), "10.0.0.5:5900");
    }

    #[test]
    fn test_token_resolver_when_tokens_configured() {
        let mut config = BridgeConfig::default();
        config.tokens.insert("desk-01".to_string(), "10.0.0.11:5900".to_string());
        config.token_param = "t".to_string();

        let resolver = build_resolver(&config);

        let known = HandshakeRequest::from_path("/websockify?t=desk-01");
        assert_eq!(resolver.resolve(&known).unwrap(), "10.0.0.11:5900");
        let missing = HandshakeRequest::from_path("/websockify?token=desk-01");
        assert_eq!(
            resolver.resolve(&missing),
            Err(ResolveError::MissingToken("t".to_string()))
        );
    }

    #[test]
    fn test_proxy_config_carries_limits() {
        let config = BridgeConfig {
            dial_timeout: Duration::from_millis(750),
            keepalive_interval: None,
            idle_timeout: Some(Duration::from_secs(60)),
            max_peers: Some(4),
            ..Default::default()
        };

        let proxy_config = build_proxy_config(&config);

        assert_eq!(proxy_config.dial_timeout, Duration::from_millis(750));
        assert_eq!(proxy_config.keepalive_interval, None);
        assert_eq!(proxy_config.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(proxy_config.max_peers, Some(4));
        assert!(proxy_config.resolver.is_some());
    }
}
