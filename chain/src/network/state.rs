//! State shared by the server, the sync loop and the local producer.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::metrics::MetricsRegistry;
use crate::storage::{AlreadyPresent, Ledger, LedgerError, PeerRegistry, Rejected};
use crate::types::{Block, Peer};

/// Everything a running node mutates.
///
/// Readers take a read lock and copy what they need out; writers hold the
/// write lock for the whole mutation, so nobody observes a chain halfway
/// through a replacement.
pub struct NodeState {
    pub ledger: RwLock<Ledger>,
    pub peers: RwLock<PeerRegistry>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Thread-safe alias for `NodeState`.
pub type SharedState = Arc<NodeState>;

impl NodeState {
    pub fn new(ledger: Ledger, peers: PeerRegistry, metrics: Arc<MetricsRegistry>) -> Self {
        metrics.ledger.chain_length.set(gauge(ledger.len()));
        metrics.network.peers_known.set(gauge(peers.len()));
        Self {
            ledger: RwLock::new(ledger),
            peers: RwLock::new(peers),
            metrics,
        }
    }

    /// Wraps the state for sharing across tasks.
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Appends a locally produced block.
    pub async fn append_local(&self, body: impl Into<Vec<u8>>) -> Result<Block, LedgerError> {
        let mut ledger = self.ledger.write().await;
        let block = ledger.append(body)?;
        self.metrics.ledger.blocks_appended.inc();
        self.metrics.ledger.chain_length.set(gauge(ledger.len()));
        Ok(block)
    }

    /// Appends a block pushed by a peer, keeping the chain unchanged if it
    /// does not verify.
    pub async fn accept_block(&self, block: Block) -> Result<(), Rejected> {
        let mut ledger = self.ledger.write().await;
        match ledger.accept_external(block) {
            Ok(()) => {
                self.metrics.ledger.blocks_accepted.inc();
                self.metrics.ledger.chain_length.set(gauge(ledger.len()));
                Ok(())
            }
            Err(rejected) => {
                self.metrics.ledger.blocks_rejected.inc();
                Err(rejected)
            }
        }
    }

    /// Swaps in `candidate` if it is still longer than the local chain.
    pub async fn adopt_chain(&self, candidate: Vec<Block>) -> bool {
        let mut ledger = self.ledger.write().await;
        let replaced = ledger.replace_if_longer(candidate);
        if replaced {
            self.metrics.network.sync_chain_replacements.inc();
            self.metrics.ledger.chain_length.set(gauge(ledger.len()));
        }
        replaced
    }

    pub async fn chain_len(&self) -> usize {
        self.ledger.read().await.len()
    }

    pub async fn add_peer(&self, peer: Peer) -> Result<(), AlreadyPresent> {
        let mut peers = self.peers.write().await;
        peers.add(peer)?;
        self.metrics.network.peers_known.set(gauge(peers.len()));
        Ok(())
    }

    /// Adds every unknown peer; returns how many were new.
    pub async fn merge_peers(&self, incoming: impl IntoIterator<Item = Peer>) -> usize {
        let mut peers = self.peers.write().await;
        let added = peers.merge(incoming);
        self.metrics.network.peers_known.set(gauge(peers.len()));
        added
    }

    pub async fn peer_snapshot(&self) -> Vec<Peer> {
        self.peers.read().await.snapshot()
    }
}

fn gauge(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
