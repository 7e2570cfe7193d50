//! Address-resolution policies.
//!
//! A policy maps the handshake metadata of an incoming session to the
//! backend address to dial (`host:port` or `:port`).  The dispatcher treats
//! its output as untrusted: an error aborts the session before any backend
//! connection is attempted, and the address is still validated by
//! [`backend::normalize_addr`](crate::backend::normalize_addr).
//!
//! Any `Fn(&HandshakeRequest) -> Result<String, ResolveError>` closure is a
//! policy, so callers can derive the address from the path, a header or
//! their own token store.

use std::collections::HashMap;

use crate::adapter::HandshakeRequest;
use crate::error::ResolveError;

/// Address used when no policy is configured.
pub const DEFAULT_BACKEND_ADDR: &str = ":5901";

/// Query parameter read by [`TokenResolver`] unless overridden.
pub const DEFAULT_TOKEN_PARAM: &str = "token";

pub trait AddressResolver: Send + Sync {
    fn resolve(&self, request: &HandshakeRequest) -> Result<String, ResolveError>;
}

impl<F> AddressResolver for F
where
    F: Fn(&HandshakeRequest) -> Result<String, ResolveError> + Send + Sync,
{
    fn resolve(&self, request: &HandshakeRequest) -> Result<String, ResolveError> {
        self(request)
    }
}

/// Always returns the same address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResolver {
    addr: String,
}

impl StaticResolver {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_ADDR)
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, _request: &HandshakeRequest) -> Result<String, ResolveError> {
        Ok(self.addr.clone())
    }
}

/// Looks the backend up by a token carried in the query string
/// (`/websockify?token=desk-01`).
#[derive(Debug, Clone)]
pub struct TokenResolver {
    param: String,
    targets: HashMap<String, String>,
}

impl TokenResolver {
    pub fn new(targets: HashMap<String, String>) -> Self {
        Self {
            param: DEFAULT_TOKEN_PARAM.to_string(),
            targets,
        }
    }

    /// Reads the token from `param` instead of `token`.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, addr: impl Into<String>) {
        self.targets.insert(token.into(), addr.into());
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for TokenResolver {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl AddressResolver for TokenResolver {
    fn resolve(&self, request: &HandshakeRequest) -> Result<String, ResolveError> {
        let token = request
            .query_param(&self.param)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ResolveError::MissingToken(self.param.clone()))?;

        self.targets
            .get(token)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownToken(token.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
