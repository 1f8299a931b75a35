//! Background chain synchronisation.
//!
//! Every interval the loop gossips for new peers, then runs one
//! longest-chain resolution over a snapshot of the registry and swaps in
//! the winner. Locks are never held across network calls: the local length
//! is read up front and re-checked under the write lock at swap time.

use std::time::Duration;

use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::consensus::{ChainSource, LongestChainResolver};
use crate::types::Peer;

use super::state::SharedState;

/// Periodic resolver driving a node towards the longest valid chain.
pub struct SyncLoop<C> {
    state: SharedState,
    resolver: LongestChainResolver<C>,
    interval: Duration,
}

impl<C: ChainSource> SyncLoop<C> {
    pub fn new(state: SharedState, source: C, interval: Duration) -> Self {
        Self {
            state,
            resolver: LongestChainResolver::new(source),
            interval,
        }
    }

    /// Runs one round. Returns the new chain length if the local chain was
    /// replaced.
    pub async fn sync_once(&self) -> Option<usize> {
        self.gossip().await;

        let peers = self.state.peer_snapshot().await;
        let local_len = self.state.chain_len().await;
        let outcome = self.resolver.resolve(&peers, local_len).await;
        self.state.metrics.network.sync_rounds.inc();

        let resolution = outcome?;
        let len = resolution.chain.len();
        if self.state.adopt_chain(resolution.chain).await {
            info!(peer = %resolution.peer, length = len, "adopted longer chain");
            Some(len)
        } else {
            debug!(peer = %resolution.peer, "local chain grew meanwhile, keeping it");
            None
        }
    }

    /// Pulls peer lists from every known peer and merges them.
    async fn gossip(&self) {
        let peers = self.state.peer_snapshot().await;
        let source = self.resolver.source();
        let queries = peers
            .iter()
            .map(|peer| async move { (peer, source.peer_list(peer).await) });

        let mut learned: Vec<Peer> = Vec::new();
        for (peer, result) in join_all(queries).await {
            match result {
                Ok(list) => learned.extend(list),
                Err(e) => debug!(%peer, error = %e, "peer list unavailable"),
            }
        }

        let added = self.state.merge_peers(learned).await;
        if added > 0 {
            info!(added, "learned new peers");
        }
    }

    /// Runs rounds forever, one per interval.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "sync loop running");

        loop {
            ticker.tick().await;
            if let Some(len) = self.sync_once().await {
                debug!(length = len, "sync round replaced chain");
            }
        }
    }
}
