// fullnode/src/main.rs

//! Full node binary.
//!
//! Runs one ledger node:
//!
//! - serves the chain to peers over the framed TCP protocol,
//! - contacts the seed peers from `peers.txt` at startup,
//! - synchronises to the longest valid chain in the background,
//! - appends every non-empty line read from stdin as a new block and
//!   pushes it to all known peers,
//! - exposes Prometheus metrics on `/metrics`.

mod config;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use chain::{
    Ledger, MetricsRegistry, NodeConfig, NodeServer, NodeState, PeerClient, PeerRegistry,
    SharedState, SyncLoop, bootstrap, broadcast_block, run_prometheus_http_server,
};
use config::Args;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fullnode=info,chain=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg: NodeConfig = Args::parse().into_node_config()?;

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::warn!("metrics HTTP server error: {e}");
            }
        });
    }

    // ---------------------------
    // Peers + shared state
    // ---------------------------

    let client = PeerClient::new(cfg.sync.peer_timeout).with_metrics(metrics.clone());

    let mut registry = PeerRegistry::with_local(cfg.advertised_addr.clone());
    registry.merge(cfg.seed_peers.iter().cloned());
    let discovered = bootstrap(&client, &cfg.seed_peers, &cfg.advertised_addr).await;
    registry.merge(discovered);
    tracing::info!(peers = registry.len(), "peer registry initialised");

    let state: SharedState = NodeState::new(Ledger::new(), registry, metrics).shared();

    // ---------------------------
    // Background sync
    // ---------------------------

    let sync = SyncLoop::new(state.clone(), client.clone(), cfg.sync.interval);
    tokio::spawn(sync.run());

    // ---------------------------
    // Local block producer (stdin)
    // ---------------------------

    tokio::spawn(read_stdin_blocks(state.clone(), client));

    // ---------------------------
    // Node server
    // ---------------------------

    let server = NodeServer::bind(cfg.listen_addr, state, cfg.sync.request_timeout)
        .await
        .map_err(|e| e.to_string())?;

    tokio::select! {
        _ = server.serve() => {}
        _ = shutdown_signal() => {}
    }

    Ok(())
}

/// Appends each non-empty stdin line as a block and broadcasts it.
async fn read_stdin_blocks(state: SharedState, client: PeerClient) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("stdin closed, no more local blocks");
                return;
            }
            Err(e) => {
                tracing::warn!("failed to read stdin: {e}");
                return;
            }
        };
        let body = line.trim();
        if body.is_empty() {
            continue;
        }

        match state.append_local(body).await {
            Ok(block) => {
                tracing::info!(
                    index = block.index,
                    hash = %block.header_hash(),
                    "appended block"
                );
                let peers = state.peer_snapshot().await;
                broadcast_block(&client, &peers, &block).await;
            }
            Err(e) => tracing::warn!("failed to append block: {e}"),
        }
    }
}

/// Waits for Ctrl-C and returns, used for shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
