//! Command-line configuration for the full node.
//!
//! Flags are parsed with `clap` and folded into a [`chain::NodeConfig`];
//! everything not set on the command line keeps the library defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use chain::{NodeConfig, Peer, config::DEFAULT_PORT, parse_peer_list};

/// Full node of the replicated ledger.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Host name peers should use to reach this node.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// File with one seed peer (`host:port`) per line.
    #[arg(long, default_value = "peers.txt")]
    pub peers: PathBuf,

    /// Seconds between two synchronisation rounds.
    #[arg(long, default_value_t = 5)]
    pub sync_interval_secs: u64,

    /// Address of the Prometheus `/metrics` exporter.
    #[arg(long, default_value_t = SocketAddr::from((Ipv4Addr::LOCALHOST, 9898)))]
    pub metrics_addr: SocketAddr,

    /// Do not start the metrics exporter.
    #[arg(long)]
    pub no_metrics: bool,
}

impl Args {
    /// Builds the node configuration, reading the seed peer file.
    pub fn into_node_config(self) -> Result<NodeConfig, String> {
        let advertised: Peer = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("invalid --host/--port: {e}"))?;

        let mut cfg = NodeConfig::new(advertised);
        cfg.seed_peers = load_seed_peers(&self.peers)?;
        cfg.sync.interval = Duration::from_secs(self.sync_interval_secs.max(1));
        cfg.metrics.enabled = !self.no_metrics;
        cfg.metrics.listen_addr = self.metrics_addr;
        Ok(cfg)
    }
}

/// Reads the seed peer file. A missing file means no seeds.
pub fn load_seed_peers(path: &Path) -> Result<Vec<Peer>, String> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_peer_list(&text).map_err(|e| format!("{}: {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "peer list not found, starting without seeds");
            Ok(Vec::new())
        }
        Err(e) => Err(format!("failed to read {}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fullnode-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["fullnode"]).unwrap();
        assert_eq!(args.port, 5000);
        assert_eq!(args.host, "localhost");
        assert_eq!(args.peers, PathBuf::from("peers.txt"));
        assert!(!args.no_metrics);
    }

    #[test]
    fn flags_reach_node_config() {
        let path = scratch_file("flags", "localhost:5001\n\nlocalhost:5002\n");
        let args = Args::try_parse_from([
            "fullnode",
            "--port",
            "5003",
            "--peers",
            path.to_str().unwrap(),
            "--sync-interval-secs",
            "2",
            "--no-metrics",
        ])
        .unwrap();

        let cfg = args.into_node_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.advertised_addr.as_str(), "localhost:5003");
        assert_eq!(cfg.listen_addr.port(), 5003);
        assert_eq!(cfg.seed_peers.len(), 2);
        assert_eq!(cfg.sync.interval, Duration::from_secs(2));
        assert!(!cfg.metrics.enabled);
    }

    #[test]
    fn missing_peer_file_is_empty_seed_set() {
        let path = std::env::temp_dir().join("fullnode-definitely-missing-peers.txt");
        assert!(load_seed_peers(&path).unwrap().is_empty());
    }

    #[test]
    fn bad_peer_file_is_an_error() {
        let path = scratch_file("bad", "localhost:5001\nnot-an-address\n");
        let result = load_seed_peers(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(result.unwrap_err().contains("not-an-address"));
    }
}
