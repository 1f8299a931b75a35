//! Top-level configuration for a ledger node.
//!
//! This module aggregates configuration for:
//!
//! - the listening socket and the address advertised to peers,
//! - the static seed peers,
//! - synchronisation timing (`SyncConfig`),
//! - metrics exporter (enable flag + listen address).
//!
//! Binaries build a `NodeConfig` from defaults and override fields from
//! command-line flags and the peer list file.

use std::net::{Ipv4Addr, SocketAddr};

use crate::consensus::SyncConfig;
use crate::types::{InvalidPeerAddress, Peer};

/// Port a node listens on when none is given.
pub const DEFAULT_PORT: u16 = 5000;

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9898)),
        }
    }
}

/// Top-level configuration for a ledger node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address the node server binds to.
    pub listen_addr: SocketAddr,
    /// Address other nodes should use to reach this one. Announced to seeds
    /// and never added to our own registry.
    pub advertised_addr: Peer,
    /// Static peers contacted at startup.
    pub seed_peers: Vec<Peer>,
    pub sync: SyncConfig,
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    /// Configuration for a node reachable as `advertised_addr` and listening
    /// on all interfaces at the same port.
    pub fn new(advertised_addr: Peer) -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, advertised_addr.port())),
            advertised_addr,
            seed_peers: Vec::new(),
            sync: SyncConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(Peer::from(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))))
    }
}

/// Parses a peer list: one `host:port` per line, surrounding whitespace and
/// blank lines ignored. Fails on the first malformed entry.
pub fn parse_peer_list(text: &str) -> Result<Vec<Peer>, InvalidPeerAddress> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::parse)
        .collect()
}
