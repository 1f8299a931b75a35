//! Registry of known peers.
//!
//! Peers are kept in insertion order without duplicates. Iteration order
//! matters: the resolver breaks length ties by it, so a registry built from
//! the same inputs always resolves the same way.

use thiserror::Error;

use crate::types::Peer;

/// The peer was already known (or is this node itself).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("peer {0} is already registered")]
pub struct AlreadyPresent(pub Peer);

/// Mutable set of peer addresses.
#[derive(Clone, Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
    /// Our own advertised address, never stored as a peer.
    local: Option<Peer>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that will ignore `local`, the node's own
    /// advertised address, whenever it shows up in gossip.
    pub fn with_local(local: Peer) -> Self {
        Self {
            peers: Vec::new(),
            local: Some(local),
        }
    }

    /// Registers a single peer.
    pub fn add(&mut self, peer: Peer) -> Result<(), AlreadyPresent> {
        if self.is_local(&peer) || self.peers.contains(&peer) {
            return Err(AlreadyPresent(peer));
        }
        self.peers.push(peer);
        Ok(())
    }

    /// Adds every peer not yet known; returns how many were new.
    pub fn merge<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = Peer>,
    {
        incoming
            .into_iter()
            .filter(|peer| self.add(peer.clone()).is_ok())
            .count()
    }

    /// Forgets a peer; returns whether it was known.
    pub fn remove(&mut self, peer: &Peer) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != peer);
        self.peers.len() != before
    }

    /// Returns `true` if `peer` is registered.
    pub fn contains(&self, peer: &Peer) -> bool {
        self.peers.contains(peer)
    }

    /// Point-in-time copy of the registered peers, in insertion order.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn is_local(&self, peer: &Peer) -> bool {
        self.local.as_ref() == Some(peer)
    }
}
