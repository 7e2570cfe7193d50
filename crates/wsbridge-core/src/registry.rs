//! Registry of active peers, owned by one [`Proxy`](crate::proxy::Proxy).
//!
//! A peer is registered only once both of its sides are open and is removed
//! before either side is closed, so a snapshot never shows a half-dead
//! session.  Admission (capacity + shutdown state) is checked under the same
//! write lock as the insert.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::BridgeError;
use crate::peer::{Peer, PeerId, PeerInfo};

#[derive(Default)]
struct RegistryState {
    peers: HashMap<PeerId, Arc<Peer>>,
    /// Set by [`PeerRegistry::drain`]; no inserts are accepted afterwards.
    closed: bool,
}

impl RegistryState {
    fn admit(&self, max: Option<usize>) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::ShuttingDown);
        }
        match max {
            Some(max) if self.peers.len() >= max => Err(BridgeError::CapacityExceeded { max }),
            _ => Ok(()),
        }
    }
}

/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `peer` unless the registry already holds `max` peers or is
    /// shutting down.
    pub async fn try_insert(&self, peer: Arc<Peer>, max: Option<usize>) -> Result<(), BridgeError> {
        let mut state = self.inner.write().await;
        state.admit(max)?;
        state.peers.insert(peer.id(), peer);
        Ok(())
    }

    /// Advisory version of the admission check done by `try_insert`, used
    /// to refuse a session before dialing its backend.
    pub async fn check_admission(&self, max: Option<usize>) -> Result<(), BridgeError> {
        self.inner.read().await.admit(max)
    }

    /// Removes the peer with `id`.  Returns `None` if it was not registered.
    pub async fn remove(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.inner.write().await.peers.remove(&id)
    }

    pub async fn contains(&self, id: PeerId) -> bool {
        self.inner.read().await.peers.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// `true` once [`PeerRegistry::drain`] has run.
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    pub async fn snapshot(&self) -> Vec<PeerInfo> {
        let state = self.inner.read().await;
        state.peers.values().map(|peer| peer.info()).collect()
    }

    /// Single-shot teardown: only the caller that wins the peer's teardown
    /// flag removes it and closes it.  Returns `true` for that caller.
    pub async fn teardown(&self, peer: &Peer) -> bool {
        if !peer.begin_teardown() {
            return false;
        }
        self.remove(peer.id()).await;
        peer.release().await;
        true
    }

    /// Refuses new peers and tears down every registered one.  Returns how
    /// many peers this call closed.
    pub async fn drain(&self) -> usize {
        let peers: Vec<Arc<Peer>> = {
            let mut state = self.inner.write().await;
            state.closed = true;
            state.peers.values().cloned().collect()
        };

        let mut closed = 0;
        for peer in peers {
            if self.teardown(&peer).await {
                closed += 1;
            }
        }
        closed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
