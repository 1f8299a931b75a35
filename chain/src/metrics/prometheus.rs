//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and two groups of strongly-typed metrics (ledger and network),
//! and an async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Metrics describing the local chain.
#[derive(Clone)]
pub struct LedgerMetrics {
    /// Current number of blocks, genesis included.
    pub chain_length: IntGauge,
    /// Blocks created locally.
    pub blocks_appended: IntCounter,
    /// Blocks pushed by peers and accepted.
    pub blocks_accepted: IntCounter,
    /// Blocks pushed by peers and rejected by verification.
    pub blocks_rejected: IntCounter,
}

impl LedgerMetrics {
    /// Registers ledger metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let chain_length = IntGauge::with_opts(Opts::new(
            "ledger_chain_length",
            "Number of blocks in the adopted chain, genesis included",
        ))?;
        registry.register(Box::new(chain_length.clone()))?;

        let blocks_appended = IntCounter::with_opts(Opts::new(
            "ledger_blocks_appended",
            "Total number of blocks appended locally",
        ))?;
        registry.register(Box::new(blocks_appended.clone()))?;

        let blocks_accepted = IntCounter::with_opts(Opts::new(
            "ledger_blocks_accepted",
            "Total number of peer-supplied blocks accepted",
        ))?;
        registry.register(Box::new(blocks_accepted.clone()))?;

        let blocks_rejected = IntCounter::with_opts(Opts::new(
            "ledger_blocks_rejected",
            "Total number of peer-supplied blocks rejected by verification",
        ))?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        Ok(Self {
            chain_length,
            blocks_appended,
            blocks_accepted,
            blocks_rejected,
        })
    }
}

/// Metrics describing synchronisation and peer traffic.
#[derive(Clone)]
pub struct NetworkMetrics {
    /// Completed sync rounds.
    pub sync_rounds: IntCounter,
    /// Sync rounds that replaced the local chain.
    pub sync_chain_replacements: IntCounter,
    /// Outbound requests that failed (unreachable, timeout, bad reply).
    pub peer_request_failures: IntCounter,
    /// Size of the peer registry.
    pub peers_known: IntGauge,
    /// Time to serve one inbound request, in seconds.
    pub rpc_request_seconds: Histogram,
}

impl NetworkMetrics {
    /// Registers network metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sync_rounds = IntCounter::with_opts(Opts::new(
            "sync_rounds",
            "Total number of completed synchronisation rounds",
        ))?;
        registry.register(Box::new(sync_rounds.clone()))?;

        let sync_chain_replacements = IntCounter::with_opts(Opts::new(
            "sync_chain_replacements",
            "Total number of times a longer peer chain was adopted",
        ))?;
        registry.register(Box::new(sync_chain_replacements.clone()))?;

        let peer_request_failures = IntCounter::with_opts(Opts::new(
            "peer_request_failures",
            "Total number of failed outbound peer requests",
        ))?;
        registry.register(Box::new(peer_request_failures.clone()))?;

        let peers_known = IntGauge::with_opts(Opts::new(
            "peers_known",
            "Number of peers in the registry",
        ))?;
        registry.register(Box::new(peers_known.clone()))?;

        let rpc_request_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "rpc_request_seconds",
                "Time to read, dispatch and answer one inbound request in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(rpc_request_seconds.clone()))?;

        Ok(Self {
            sync_rounds,
            sync_chain_replacements,
            peer_request_failures,
            peers_known,
            rpc_request_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the node's metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub ledger: LedgerMetrics,
    pub network: NetworkMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let ledger = LedgerMetrics::register(&registry)?;
        let network = NetworkMetrics::register(&registry)?;
        Ok(Self {
            registry,
            ledger,
            network,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics exporter listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "metrics connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, content_type, body) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4",
            Bytes::from(metrics.gather_text()),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"not found"),
        ),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn ledger_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = LedgerMetrics::register(&registry).expect("register metrics");

        metrics.chain_length.set(4);
        metrics.blocks_appended.inc();
        metrics.blocks_rejected.inc();

        let metric_families = registry.gather();
        assert_eq!(metric_families.len(), 4);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        NetworkMetrics::register(&registry).expect("first registration");
        assert!(NetworkMetrics::register(&registry).is_err());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.ledger.chain_length.set(7);
        registry.network.rpc_request_seconds.observe(0.01);

        let text = registry.gather_text();
        assert!(text.contains("ledger_chain_length 7"));
        assert!(text.contains("rpc_request_seconds_bucket"));
        assert!(text.contains("peers_known"));
    }

    #[tokio::test]
    async fn exporter_serves_metrics_over_http() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let registry = Arc::new(MetricsRegistry::new().expect("create metrics registry"));
        registry.ledger.blocks_appended.inc_by(3);

        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);
        tokio::spawn(run_prometheus_http_server(registry, addr));

        let mut stream = None;
        for _ in 0..50 {
            match tokio::net::TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            }
        }
        let mut stream = stream.expect("exporter did not start");
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();

        assert!(reply.starts_with("HTTP/1.1 200"));
        assert!(reply.contains("ledger_blocks_appended 3"));
    }
}
