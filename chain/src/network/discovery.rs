//! Peer discovery at startup and block propagation.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::types::{Block, Peer};

use super::client::PeerClient;

/// Contacts the static seeds and returns every peer learned from them.
///
/// Live seeds (those answering a ping) are asked to register `me` and to
/// share their own peer lists. The returned list contains the live seeds
/// first, then newly learned peers, without duplicates and never `me`.
pub async fn bootstrap(client: &PeerClient, seeds: &[Peer], me: &Peer) -> Vec<Peer> {
    let pings = seeds
        .iter()
        .filter(|seed| *seed != me)
        .map(|seed| async move { (seed, client.ping(seed).await) });

    let live: Vec<Peer> = join_all(pings)
        .await
        .into_iter()
        .filter_map(|(seed, result)| match result {
            Ok(true) => Some(seed.clone()),
            Ok(false) => {
                warn!(peer = %seed, "seed answered ping without pong");
                None
            }
            Err(e) => {
                warn!(peer = %seed, error = %e, "seed unreachable");
                None
            }
        })
        .collect();

    let exchanges = live.iter().map(|seed| async move {
        if let Err(e) = client.announce(seed, me).await {
            warn!(peer = %seed, error = %e, "failed to announce to seed");
        }
        match client.get_peers(seed).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(peer = %seed, error = %e, "failed to fetch peers from seed");
                Vec::new()
            }
        }
    });
    let learned = join_all(exchanges).await;

    let mut found: Vec<Peer> = Vec::new();
    for peer in live.iter().cloned().chain(learned.into_iter().flatten()) {
        if &peer != me && !found.contains(&peer) {
            found.push(peer);
        }
    }

    info!(
        seeds = seeds.len(),
        live = live.len(),
        discovered = found.len(),
        "bootstrap finished"
    );
    found
}

/// Pushes `block` to every peer concurrently; returns how many accepted it.
pub async fn broadcast_block(client: &PeerClient, peers: &[Peer], block: &Block) -> usize {
    let sends = peers
        .iter()
        .map(|peer| async move { (peer, client.send_block(peer, block).await) });

    let accepted = join_all(sends)
        .await
        .into_iter()
        .filter(|(peer, result)| match result {
            Ok(()) => true,
            Err(e) => {
                debug!(%peer, index = block.index, error = %e, "peer did not take block");
                false
            }
        })
        .count();

    info!(index = block.index, accepted, peers = peers.len(), "broadcast block");
    accepted
}
