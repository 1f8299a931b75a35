//! Chain library crate.
//!
//! This crate provides the building blocks of a replicated, append-only
//! ledger node. Every node keeps a hash-linked chain in memory, serves it to
//! peers over a small length-prefixed TCP protocol, and periodically adopts
//! the longest valid chain it can find among its peers.
//!
//! - strongly-typed domain types and the block codec (`types`),
//! - chain verification and longest-chain resolution (`consensus`),
//! - the in-memory ledger and peer registry (`storage`),
//! - framing, RPC, server, client and sync loop (`network`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! The `fullnode` binary composes these pieces into a running node.

pub mod clock;
pub mod config;
pub mod consensus;
pub mod metrics;
pub mod network;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{MetricsConfig, NodeConfig, parse_peer_list};

// Re-export "core" consensus types and traits.
pub use consensus::{
    CandidateRejected, ChainSource, LongestChainResolver, Resolution, SyncConfig,
    VerificationFailure, verify_chain,
};

// Re-export the state holders.
pub use storage::{AlreadyPresent, Ledger, LedgerError, PeerRegistry, Rejected};

// Re-export the networking entry points.
pub use network::{
    NodeError, NodeServer, NodeState, PeerClient, PeerError, SharedState, SyncLoop, bootstrap,
    broadcast_block,
};

// Re-export metrics registry and exporter.
pub use metrics::{MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;
