//! Longest-chain resolution across peers.
//!
//! One round works on a snapshot of the peer registry:
//!
//! 1. ask every peer for its chain length, dropping peers that fail,
//! 2. order the answers by length, longest first,
//! 3. for each peer longer than the local chain, fetch its full chain,
//! 4. keep the first chain that has the advertised length, verifies, and
//!    starts from our genesis block.
//!
//! Ties between equally long chains are broken by registry order: the sort
//! is stable, so the peer enumerated first wins. There is no weighting by
//! work or stake; length is the only criterion.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::network::client::PeerError;
use crate::types::{Block, Peer};

use super::error::CandidateRejected;
use super::verify::verify_chain;

/// Read access to remote chains, as needed by the resolver.
///
/// The TCP client implements this for real peers; tests plug in fakes.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Number of blocks in the peer's chain.
    async fn chain_length(&self, peer: &Peer) -> Result<usize, PeerError>;

    /// The peer's full chain, genesis first.
    async fn fetch_chain(&self, peer: &Peer) -> Result<Vec<Block>, PeerError>;

    /// Peers known to `peer`, used for gossip. Sources without a notion of
    /// peers report none.
    async fn peer_list(&self, _peer: &Peer) -> Result<Vec<Peer>, PeerError> {
        Ok(Vec::new())
    }
}

/// A chain chosen by the resolver, with the peer that served it.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub peer: Peer,
    pub chain: Vec<Block>,
}

/// Longest-chain rule over a [`ChainSource`].
pub struct LongestChainResolver<C> {
    source: C,
    genesis: Block,
}

impl<C: ChainSource> LongestChainResolver<C> {
    /// Creates a resolver that accepts only chains rooted at the standard
    /// genesis block.
    pub fn new(source: C) -> Self {
        Self {
            source,
            genesis: Block::genesis(),
        }
    }

    /// Returns the underlying chain source.
    pub fn source(&self) -> &C {
        &self.source
    }

    /// Runs one resolution round.
    ///
    /// Returns `None` when no peer offers a valid chain longer than
    /// `local_len`; the caller keeps its own chain in that case.
    pub async fn resolve(&self, peers: &[Peer], local_len: usize) -> Option<Resolution> {
        let candidates = self.survey(peers).await;

        for (peer, claimed) in candidates {
            if claimed <= local_len {
                break;
            }

            let chain = match self.source.fetch_chain(&peer).await {
                Ok(chain) => chain,
                Err(e) => {
                    warn!(%peer, error = %e, "failed to fetch candidate chain");
                    continue;
                }
            };

            match self.check_candidate(&chain, claimed) {
                Ok(()) => {
                    info!(%peer, length = chain.len(), local_len, "found longer valid chain");
                    return Some(Resolution { peer, chain });
                }
                Err(reason) => {
                    warn!(%peer, %reason, "discarding candidate chain");
                }
            }
        }

        None
    }

    /// Queries all peers for their chain length concurrently.
    ///
    /// The result is sorted longest first; peers with equal lengths keep
    /// the order in which they appear in `peers`.
    pub async fn survey(&self, peers: &[Peer]) -> Vec<(Peer, usize)> {
        let queries = peers.iter().map(|peer| async move {
            (peer, self.source.chain_length(peer).await)
        });

        let mut candidates: Vec<(Peer, usize)> = join_all(queries)
            .await
            .into_iter()
            .filter_map(|(peer, result)| match result {
                Ok(len) => {
                    debug!(%peer, len, "peer reported chain length");
                    Some((peer.clone(), len))
                }
                Err(e) => {
                    warn!(%peer, error = %e, "skipping peer for this round");
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates
    }

    fn check_candidate(&self, chain: &[Block], claimed: usize) -> Result<(), CandidateRejected> {
        if chain.len() != claimed {
            return Err(CandidateRejected::LengthMismatch {
                claimed,
                served: chain.len(),
            });
        }
        verify_chain(chain)?;
        if chain.first() != Some(&self.genesis) {
            return Err(CandidateRejected::ForeignGenesis);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Ledger;
    use std::collections::HashMap;
    use std::time::Duration;

    /// In-memory stand-in for a set of peers.
    #[derive(Default)]
    struct FakeSource {
        chains: HashMap<Peer, Vec<Block>>,
        /// Overrides the advertised length, to model lying peers.
        claims: HashMap<Peer, usize>,
    }

    impl FakeSource {
        fn serve(mut self, peer: &Peer, chain: Vec<Block>) -> Self {
            self.chains.insert(peer.clone(), chain);
            self
        }

        fn claim(mut self, peer: &Peer, len: usize) -> Self {
            self.claims.insert(peer.clone(), len);
            self
        }
    }

    #[async_trait]
    impl ChainSource for FakeSource {
        async fn chain_length(&self, peer: &Peer) -> Result<usize, PeerError> {
            if let Some(len) = self.claims.get(peer) {
                return Ok(*len);
            }
            self.chains
                .get(peer)
                .map(Vec::len)
                .ok_or_else(|| unreachable(peer))
        }

        async fn fetch_chain(&self, peer: &Peer) -> Result<Vec<Block>, PeerError> {
            self.chains.get(peer).cloned().ok_or_else(|| unreachable(peer))
        }
    }

    fn unreachable(peer: &Peer) -> PeerError {
        PeerError::Timeout {
            peer: peer.clone(),
            timeout: Duration::from_millis(1),
        }
    }

    fn peer(port: u16) -> Peer {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn chain_of(bodies: &[&str]) -> Vec<Block> {
        let mut ledger = Ledger::new();
        for (i, body) in bodies.iter().enumerate() {
            ledger
                .append_at(body.as_bytes().to_vec(), 100 + i as u64)
                .unwrap();
        }
        ledger.export()
    }

    #[tokio::test]
    async fn adopts_longest_valid_chain() {
        let (a, b) = (peer(1), peer(2));
        let source = FakeSource::default()
            .serve(&a, chain_of(&["x"]))
            .serve(&b, chain_of(&["x", "y", "z"]));
        let resolver = LongestChainResolver::new(source);

        let res = resolver.resolve(&[a, b.clone()], 1).await.expect("b is longer");
        assert_eq!(res.peer, b);
        assert_eq!(res.chain.len(), 4);
    }

    #[tokio::test]
    async fn keeps_local_chain_when_nobody_is_longer() {
        let a = peer(1);
        let source = FakeSource::default().serve(&a, chain_of(&["x", "y"]));
        let resolver = LongestChainResolver::new(source);

        assert!(resolver.resolve(&[a.clone()], 3).await.is_none());
        assert!(resolver.resolve(&[a], 5).await.is_none());
    }

    #[tokio::test]
    async fn ties_go_to_the_first_enumerated_peer() {
        let (a, b) = (peer(1), peer(2));
        let source = FakeSource::default()
            .serve(&a, chain_of(&["from-a", "a2"]))
            .serve(&b, chain_of(&["from-b", "b2"]));
        let resolver = LongestChainResolver::new(source);

        for _ in 0..10 {
            let res = resolver.resolve(&[a.clone(), b.clone()], 1).await.unwrap();
            assert_eq!(res.peer, a);
            let res = resolver.resolve(&[b.clone(), a.clone()], 1).await.unwrap();
            assert_eq!(res.peer, b);
        }
    }

    #[tokio::test]
    async fn falls_back_when_longest_candidate_is_invalid() {
        let (bad, good) = (peer(1), peer(2));
        let mut tampered = chain_of(&["a", "b", "c", "d"]);
        tampered[2].body = b"evil".to_vec();

        let source = FakeSource::default()
            .serve(&bad, tampered)
            .serve(&good, chain_of(&["a", "b"]));
        let resolver = LongestChainResolver::new(source);

        let res = resolver.resolve(&[bad, good.clone()], 1).await.unwrap();
        assert_eq!(res.peer, good);
        assert_eq!(res.chain.len(), 3);
    }

    #[tokio::test]
    async fn discards_peer_that_lies_about_length() {
        let (liar, honest) = (peer(1), peer(2));
        let source = FakeSource::default()
            .serve(&liar, chain_of(&["a"]))
            .claim(&liar, 10)
            .serve(&honest, chain_of(&["a", "b"]));
        let resolver = LongestChainResolver::new(source);

        let res = resolver.resolve(&[liar, honest.clone()], 1).await.unwrap();
        assert_eq!(res.peer, honest);
    }

    #[tokio::test]
    async fn rejects_chain_with_foreign_genesis() {
        let other = peer(1);
        let foreign_genesis = Block::new(0, crate::types::Hash256::ZERO, 0, b"other".to_vec()).unwrap();
        let b1 = Block::new(1, foreign_genesis.header_hash(), 1, b"x".to_vec()).unwrap();

        let source = FakeSource::default().serve(&other, vec![foreign_genesis, b1]);
        let resolver = LongestChainResolver::new(source);

        assert!(resolver.resolve(&[other], 1).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_peers_are_skipped() {
        let (down, up) = (peer(1), peer(2));
        let source = FakeSource::default().serve(&up, chain_of(&["a"]));
        let resolver = LongestChainResolver::new(source);

        let survey = resolver.survey(&[down.clone(), up.clone()]).await;
        assert_eq!(survey, vec![(up.clone(), 2)]);

        let res = resolver.resolve(&[down, up.clone()], 1).await.unwrap();
        assert_eq!(res.peer, up);
    }

    #[tokio::test]
    async fn survey_orders_by_length_descending() {
        let (a, b, c) = (peer(1), peer(2), peer(3));
        let source = FakeSource::default()
            .serve(&a, chain_of(&["1"]))
            .serve(&b, chain_of(&["1", "2", "3"]))
            .serve(&c, chain_of(&["1", "2"]));
        let resolver = LongestChainResolver::new(source);

        let lengths: Vec<usize> = resolver
            .survey(&[a, b, c])
            .await
            .into_iter()
            .map(|(_, len)| len)
            .collect();
        assert_eq!(lengths, vec![4, 3, 2]);
    }
}
