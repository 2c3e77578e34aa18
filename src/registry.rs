//! Live peer roster.
//!
//! The relay pushes the complete roster on every update; the previous set
//! is discarded wholesale. No diffing — consumers rebuild their view from
//! each snapshot, which is cheap at roster-update frequency.

/// Opaque peer identifier assigned by the relay. Unique per active
/// connection; not stable across reconnects.
pub type PeerId = String;

#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Vec<PeerId>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire roster. Stale entries for disconnected peers are
    /// implicitly dropped by the replacement.
    pub fn replace(&mut self, peers: Vec<PeerId>) {
        self.peers = peers;
    }

    /// Current roster, in the order the relay sent it.
    pub fn snapshot(&self) -> &[PeerId] {
        &self.peers
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.iter().any(|p| p == id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
