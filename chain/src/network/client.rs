//! Outbound requests to peers.
//!
//! Each call opens a fresh TCP connection, writes one framed request, reads
//! one framed response and closes. The whole exchange (connect, write, read)
//! is bounded by a single timeout, so a dead or stalled peer costs at most
//! that long.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use crate::consensus::ChainSource;
use crate::metrics::MetricsRegistry;
use crate::types::{Block, Peer};

use super::framing::{FrameError, read_frame, write_frame};
use super::rpc::{BlockDto, Request, Response, blocks_from_json};

/// Text a node answers with when the announced peer is already registered.
const ALREADY_IN_PEERS: &str = "Already in peers";

/// Failure of a single outbound request.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {source}")]
    Unreachable {
        peer: Peer,
        #[source]
        source: io::Error,
    },
    #[error("peer {peer} did not answer within {timeout:?}")]
    Timeout { peer: Peer, timeout: Duration },
    #[error("framing error talking to {peer}: {source}")]
    Frame {
        peer: Peer,
        #[source]
        source: FrameError,
    },
    #[error("malformed reply from {peer}: {reason}")]
    Protocol { peer: Peer, reason: String },
    #[error("peer {peer} refused `{request}` with {code}: {message}")]
    Status {
        peer: Peer,
        request: &'static str,
        code: u16,
        message: String,
    },
}

impl PeerError {
    /// Address of the peer the request was sent to.
    pub fn peer(&self) -> &Peer {
        match self {
            PeerError::Unreachable { peer, .. }
            | PeerError::Timeout { peer, .. }
            | PeerError::Frame { peer, .. }
            | PeerError::Protocol { peer, .. }
            | PeerError::Status { peer, .. } => peer,
        }
    }
}

/// Client for the node-to-node protocol.
#[derive(Clone)]
pub struct PeerClient {
    timeout: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl PeerClient {
    /// Creates a client whose requests are each bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            metrics: None,
        }
    }

    /// Counts failed requests in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sends `request` to `peer` and returns the raw response, whatever its
    /// status code.
    pub async fn request(&self, peer: &Peer, request: &Request) -> Result<Response, PeerError> {
        let result = match tokio::time::timeout(self.timeout, self.exchange(peer, request)).await {
            Ok(result) => result,
            Err(_) => Err(PeerError::Timeout {
                peer: peer.clone(),
                timeout: self.timeout,
            }),
        };
        if let Err(err) = &result {
            debug!(%peer, kind = request.kind(), error = %err, "peer request failed");
            if let Some(metrics) = &self.metrics {
                metrics.network.peer_request_failures.inc();
            }
        }
        result
    }

    async fn exchange(&self, peer: &Peer, request: &Request) -> Result<Response, PeerError> {
        let payload = request.encode().map_err(|e| protocol(peer, e))?;

        let mut stream = TcpStream::connect(peer.as_str())
            .await
            .map_err(|source| PeerError::Unreachable {
                peer: peer.clone(),
                source,
            })?;

        write_frame(&mut stream, &payload)
            .await
            .map_err(|source| frame(peer, source))?;
        let reply = read_frame(&mut stream)
            .await
            .map_err(|source| frame(peer, source))?;

        Response::decode(&reply).map_err(|e| protocol(peer, e))
    }

    /// Like [`request`](Self::request) but turns a non-200 status into
    /// [`PeerError::Status`] and yields only the payload.
    async fn call(&self, peer: &Peer, request: Request) -> Result<Value, PeerError> {
        let response = self.request(peer, &request).await?;
        if !response.is_ok() {
            return Err(PeerError::Status {
                peer: peer.clone(),
                request: request.kind(),
                code: response.http_code,
                message: response.message(),
            });
        }
        Ok(response.response)
    }

    /// Returns `true` if the peer answers a ping with `"pong"`.
    pub async fn ping(&self, peer: &Peer) -> Result<bool, PeerError> {
        let value = self.call(peer, Request::Ping).await?;
        Ok(value.as_str() == Some("pong"))
    }

    /// Number of blocks in the peer's chain.
    pub async fn get_length(&self, peer: &Peer) -> Result<usize, PeerError> {
        let value = self.call(peer, Request::GetLength).await?;
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| protocol(peer, format!("expected a length, got {value}")))
    }

    /// The peer's full chain.
    pub async fn get_blocks(&self, peer: &Peer) -> Result<Vec<Block>, PeerError> {
        let value = self.call(peer, Request::GetBlocks).await?;
        blocks_from_json(value).map_err(|reason| protocol(peer, reason))
    }

    /// A single block from the peer's chain.
    pub async fn get_block(&self, peer: &Peer, index: usize) -> Result<Block, PeerError> {
        let value = self.call(peer, Request::GetBlock(index)).await?;
        let dto: BlockDto = serde_json::from_value(value).map_err(|e| protocol(peer, e))?;
        dto.into_block().map_err(|e| protocol(peer, e))
    }

    /// Peers known to `peer`. Malformed addresses in the reply are dropped.
    pub async fn get_peers(&self, peer: &Peer) -> Result<Vec<Peer>, PeerError> {
        let value = self.call(peer, Request::GetPeers).await?;
        let Value::Array(items) = value else {
            return Err(protocol(peer, "expected a list of peers"));
        };
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| s.parse::<Peer>().ok())
            .collect())
    }

    /// Asks `peer` to register `me`. Being already registered counts as
    /// success.
    pub async fn announce(&self, peer: &Peer, me: &Peer) -> Result<(), PeerError> {
        match self.call(peer, Request::AddPeer(me.clone())).await {
            Ok(_) => Ok(()),
            Err(PeerError::Status { message, .. }) if message == ALREADY_IN_PEERS => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Pushes `block` to `peer` for appending.
    pub async fn send_block(&self, peer: &Peer, block: &Block) -> Result<(), PeerError> {
        self.call(peer, Request::ReceiveBlock(block.clone()))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ChainSource for PeerClient {
    async fn chain_length(&self, peer: &Peer) -> Result<usize, PeerError> {
        self.get_length(peer).await
    }

    async fn fetch_chain(&self, peer: &Peer) -> Result<Vec<Block>, PeerError> {
        self.get_blocks(peer).await
    }

    async fn peer_list(&self, peer: &Peer) -> Result<Vec<Peer>, PeerError> {
        self.get_peers(peer).await
    }
}

fn protocol(peer: &Peer, reason: impl ToString) -> PeerError {
    PeerError::Protocol {
        peer: peer.clone(),
        reason: reason.to_string(),
    }
}

fn frame(peer: &Peer, source: FrameError) -> PeerError {
    PeerError::Frame {
        peer: peer.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Accepts one connection and answers it with `response`.
    async fn one_shot_server(response: Response) -> (Peer, tokio::task::JoinHandle<Request>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = Peer::from(listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let bytes = read_frame(&mut stream).await.unwrap();
            let request = Request::decode(&bytes).unwrap();
            write_frame(&mut stream, &response.encode().unwrap())
                .await
                .unwrap();
            request
        });
        (peer, handle)
    }

    #[tokio::test]
    async fn get_length_reads_integer_payload() {
        let (peer, server) = one_shot_server(Response::ok(json!(4))).await;
        let client = PeerClient::new(Duration::from_secs(2));

        assert_eq!(client.get_length(&peer).await.unwrap(), 4);
        assert_eq!(server.await.unwrap(), Request::GetLength);
    }

    #[tokio::test]
    async fn bad_status_becomes_status_error() {
        let (peer, _server) = one_shot_server(Response::bad_request("Block not found")).await;
        let client = PeerClient::new(Duration::from_secs(2));

        match client.get_block(&peer, 9).await {
            Err(PeerError::Status {
                request,
                code,
                message,
                ..
            }) => {
                assert_eq!(request, "get_block");
                assert_eq!(code, 400);
                assert_eq!(message, "Block not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn announce_tolerates_already_registered() {
        let (peer, server) = one_shot_server(Response::bad_request(ALREADY_IN_PEERS)).await;
        let client = PeerClient::new(Duration::from_secs(2));
        let me: Peer = "127.0.0.1:7000".parse().unwrap();

        client.announce(&peer, &me).await.unwrap();
        assert_eq!(server.await.unwrap(), Request::AddPeer(me));
    }

    #[tokio::test]
    async fn get_peers_skips_malformed_entries() {
        let (peer, _server) =
            one_shot_server(Response::ok(json!(["a:1", "garbage", 5, "b:2"]))).await;
        let client = PeerClient::new(Duration::from_secs(2));

        let peers = client.get_peers(&peer).await.unwrap();
        let expected: Vec<Peer> = vec!["a:1".parse().unwrap(), "b:2".parse().unwrap()];
        assert_eq!(peers, expected);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = Peer::from(listener.local_addr().unwrap());
        drop(listener);

        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let client = PeerClient::new(Duration::from_secs(2)).with_metrics(metrics.clone());

        assert!(matches!(
            client.ping(&peer).await,
            Err(PeerError::Unreachable { .. })
        ));
        assert_eq!(metrics.network.peer_request_failures.get(), 1);
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = Peer::from(listener.local_addr().unwrap());
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let client = PeerClient::new(Duration::from_millis(100));
        let err = client.get_length(&peer).await.unwrap_err();
        assert!(matches!(err, PeerError::Timeout { .. }));
        assert_eq!(err.peer(), &peer);
    }
}
