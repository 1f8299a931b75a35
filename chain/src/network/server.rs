//! Inbound request handling.
//!
//! The server accepts TCP connections and serves exactly one request per
//! connection: read a frame, dispatch it against the shared state, write
//! the response frame, close. Handlers only touch local state; they never
//! call out to other peers.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
use super::rpc::{BlockDto, ProtocolViolation, Request, Response, blocks_to_json};
use super::state::{NodeState, SharedState};

/// Fatal node errors. These only occur during startup.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to initialise metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Answers one decoded request.
pub async fn dispatch(state: &NodeState, request: Request) -> Response {
    match request {
        Request::GetBlocks => {
            let ledger = state.ledger.read().await;
            Response::ok(blocks_to_json(ledger.blocks()))
        }
        Request::GetBlock(index) => {
            let ledger = state.ledger.read().await;
            match ledger.get(index) {
                Some(block) => Response::ok(BlockDto::from(block).to_json()),
                None => Response::bad_request("Block not found"),
            }
        }
        Request::GetLength => {
            let len = state.chain_len().await;
            Response::ok(json!(len))
        }
        Request::GetPeers => {
            let peers: Vec<Value> = state
                .peer_snapshot()
                .await
                .iter()
                .map(|p| Value::String(p.to_string()))
                .collect();
            Response::ok(Value::Array(peers))
        }
        Request::Ping => Response::ok(json!("pong")),
        Request::ReceiveBlock(block) => {
            let index = block.index;
            match state.accept_block(block).await {
                Ok(()) => {
                    info!(index, "accepted block from peer");
                    Response::ok(json!("OK, block added"))
                }
                Err(rejected) => {
                    warn!(index, reason = %rejected.0, "rejected block from peer");
                    Response::bad_request(format!("Invalid chain: {}", rejected.0))
                }
            }
        }
        Request::AddPeer(peer) => match state.add_peer(peer.clone()).await {
            Ok(()) => {
                info!(%peer, "registered peer");
                Response::ok(json!("OK"))
            }
            Err(_) => Response::bad_request("Already in peers"),
        },
    }
}

/// Decodes a raw request payload and dispatches it. Malformed input yields
/// a 400 response rather than an error.
pub async fn handle_payload(state: &NodeState, payload: &[u8]) -> Response {
    match Request::decode(payload) {
        Ok(request) => {
            debug!(kind = request.kind(), "handling request");
            dispatch(state, request).await
        }
        Err(violation) => {
            debug!(error = %violation, "refusing malformed request");
            violation_response(&violation)
        }
    }
}

/// Message of the 400 sent in place of a reply that cannot be framed.
const RESPONSE_TOO_LARGE: &str = "Response too large";

/// Encodes `response` as a frame payload of at most `limit` bytes, falling
/// back to a 400 when the encoded reply does not fit.
fn frame_response(response: &Response, limit: usize) -> Vec<u8> {
    let refused = match response.encode() {
        Ok(bytes) if bytes.len() <= limit => return bytes,
        Ok(bytes) => format!("{} bytes over a {limit} byte frame limit", bytes.len()),
        Err(e) => e.to_string(),
    };
    warn!(reason = %refused, "cannot send reply, answering 400 instead");
    Response::bad_request(RESPONSE_TOO_LARGE)
        .encode()
        .unwrap_or_default()
}

fn violation_response(violation: &ProtocolViolation) -> Response {
    match violation {
        ProtocolViolation::UnknownRequest(_) => Response::unknown_request(),
        ProtocolViolation::InvalidBody {
            kind: "add_peer" | "add_me",
            ..
        } => Response::bad_request("Invalid peer address"),
        other => Response::bad_request(other.to_string()),
    }
}

/// TCP front end of a node.
pub struct NodeServer {
    listener: TcpListener,
    state: SharedState,
    request_timeout: Duration,
}

impl NodeServer {
    /// Binds the listening socket. Port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(
        addr: SocketAddr,
        state: SharedState,
        request_timeout: Duration,
    ) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        Ok(Self {
            listener,
            state,
            request_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the task is dropped, one task per
    /// connection.
    pub async fn serve(self) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "node listening");
        }
        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };
            let state = self.state.clone();
            let timeout = self.request_timeout;
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, &state, timeout).await {
                    debug!(%remote, error = %e, "connection closed without a response");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    state: &NodeState,
    timeout: Duration,
) -> Result<(), FrameError> {
    let started = Instant::now();
    let payload = match tokio::time::timeout(timeout, read_frame(&mut stream)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "request not received in time",
            )));
        }
    };

    let response = handle_payload(state, &payload).await;
    let bytes = frame_response(&response, MAX_FRAME_LEN);
    if let Err(e) = write_frame(&mut stream, &bytes).await {
        warn!(error = %e, "failed to send response");
        return Err(e);
    }

    state
        .metrics
        .network
        .rpc_request_seconds
        .observe(started.elapsed().as_secs_f64());
    Ok(())
}
