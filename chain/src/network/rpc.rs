//! Request/response schema carried inside frames.
//!
//! Messages are JSON objects:
//!
//! ```json
//! { "request": "get_block", "body": 3 }
//! { "response": { "index": 3, ... }, "time": 1700000000.25, "http_code": 200 }
//! ```
//!
//! On the way in, the loose envelope is first parsed and then narrowed into
//! the closed [`Request`] enum, so an unknown kind is a distinct, reportable
//! case rather than a parse failure of the whole message.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::clock::unix_seconds_f64;
use crate::types::{Block, Hash256, HashParseError, MalformedBlock, Peer};

/// Status code of a successful response.
pub const HTTP_OK: u16 = 200;
/// Status code of a refused or malformed request.
pub const HTTP_BAD_REQUEST: u16 = 400;

/// Text of the response to an unrecognised request kind.
pub const UNKNOWN_REQUEST: &str = "Unknown request";

/// Malformed or unsupported inbound message.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown request kind `{0}`")]
    UnknownRequest(String),
    #[error("request `{kind}` requires a body")]
    MissingBody { kind: &'static str },
    #[error("invalid body for `{kind}`: {reason}")]
    InvalidBody { kind: &'static str, reason: String },
}

/// Wire shape of a request before its kind is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestEnvelope {
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Every request a node understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Full chain.
    GetBlocks,
    /// Single block by index.
    GetBlock(usize),
    /// Chain length.
    GetLength,
    /// Known peer addresses.
    GetPeers,
    /// Liveness probe, answered with `"pong"`.
    Ping,
    /// A block pushed by a peer for appending. The wire name keeps the
    /// historical spelling `recieve_block`.
    ReceiveBlock(Block),
    /// Registers the given address as a peer (`add_peer` or `add_me`).
    AddPeer(Peer),
}

impl Request {
    /// Kind string as sent on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetBlocks => "get_blocks",
            Request::GetBlock(_) => "get_block",
            Request::GetLength => "get_length",
            Request::GetPeers => "get_peers",
            Request::Ping => "ping",
            Request::ReceiveBlock(_) => "recieve_block",
            Request::AddPeer(_) => "add_peer",
        }
    }

    /// Builds the wire envelope for this request.
    pub fn to_envelope(&self) -> RequestEnvelope {
        let body = match self {
            Request::GetBlock(index) => Some(json!(index)),
            Request::ReceiveBlock(block) => Some(BlockDto::from(block).to_json()),
            Request::AddPeer(peer) => Some(json!(peer.as_str())),
            Request::GetBlocks | Request::GetLength | Request::GetPeers | Request::Ping => None,
        };
        RequestEnvelope {
            request: self.kind().to_string(),
            body,
        }
    }

    /// Narrows a parsed envelope into a known request.
    pub fn from_envelope(envelope: RequestEnvelope) -> Result<Self, ProtocolViolation> {
        let RequestEnvelope { request, body } = envelope;
        match request.as_str() {
            "get_blocks" => Ok(Request::GetBlocks),
            "get_length" => Ok(Request::GetLength),
            "get_peers" => Ok(Request::GetPeers),
            "ping" => Ok(Request::Ping),
            "get_block" => {
                let kind = "get_block";
                let index = require_body(kind, body)?
                    .as_u64()
                    .ok_or_else(|| invalid(kind, "expected a non-negative integer index"))?;
                let index = usize::try_from(index).map_err(|_| invalid(kind, "index out of range"))?;
                Ok(Request::GetBlock(index))
            }
            "recieve_block" => {
                let kind = "recieve_block";
                let dto: BlockDto = serde_json::from_value(require_body(kind, body)?)
                    .map_err(|e| invalid(kind, e))?;
                let block = dto.into_block().map_err(|e| invalid(kind, e))?;
                Ok(Request::ReceiveBlock(block))
            }
            "add_peer" | "add_me" => {
                let kind = if request == "add_me" { "add_me" } else { "add_peer" };
                let addr = require_body(kind, body)?;
                let addr = addr
                    .as_str()
                    .ok_or_else(|| invalid(kind, "expected a host:port string"))?;
                let peer = addr.parse::<Peer>().map_err(|e| invalid(kind, e))?;
                Ok(Request::AddPeer(peer))
            }
            _ => Err(ProtocolViolation::UnknownRequest(request)),
        }
    }

    /// Serializes this request to frame payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolViolation> {
        Ok(serde_json::to_vec(&self.to_envelope())?)
    }

    /// Parses frame payload bytes into a request.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolViolation> {
        let envelope: RequestEnvelope = serde_json::from_slice(bytes)?;
        Self::from_envelope(envelope)
    }
}

fn require_body(kind: &'static str, body: Option<Value>) -> Result<Value, ProtocolViolation> {
    match body {
        Some(Value::Null) | None => Err(ProtocolViolation::MissingBody { kind }),
        Some(value) => Ok(value),
    }
}

fn invalid(kind: &'static str, reason: impl ToString) -> ProtocolViolation {
    ProtocolViolation::InvalidBody {
        kind,
        reason: reason.to_string(),
    }
}

/// Reply to any request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Payload: a message string or structured data.
    pub response: Value,
    /// Server time when the response was built, in seconds.
    pub time: f64,
    /// HTTP-style status: 200 on success, 400 otherwise.
    pub http_code: u16,
}

impl Response {
    pub fn new(response: Value, http_code: u16) -> Self {
        Self {
            response,
            time: unix_seconds_f64(),
            http_code,
        }
    }

    /// A 200 response.
    pub fn ok(response: Value) -> Self {
        Self::new(response, HTTP_OK)
    }

    /// A 400 response carrying a human-readable message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Value::String(message.into()), HTTP_BAD_REQUEST)
    }

    /// The response to a request kind the node does not recognise.
    pub fn unknown_request() -> Self {
        Self::bad_request(UNKNOWN_REQUEST)
    }

    pub fn is_ok(&self) -> bool {
        self.http_code == HTTP_OK
    }

    /// The payload as text, for message-style responses.
    pub fn message(&self) -> String {
        match &self.response {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolViolation> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolViolation> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// JSON form of a [`Block`]: hashes and body are hex encoded and the body
/// length is implied by the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDto {
    pub index: u32,
    pub prev_hash: String,
    pub body_hash: String,
    pub time: u64,
    pub body: String,
}

/// Failure to turn a [`BlockDto`] back into a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockDtoError {
    #[error("field `{field}`: {source}")]
    Hash {
        field: &'static str,
        source: HashParseError,
    },
    #[error("field `body` is not valid hex")]
    BodyHex,
    #[error(transparent)]
    Malformed(#[from] MalformedBlock),
}

impl BlockDto {
    /// Converts back into a block, keeping the transmitted body hash.
    pub fn into_block(self) -> Result<Block, BlockDtoError> {
        let prev = Hash256::from_hex(&self.prev_hash).map_err(|source| BlockDtoError::Hash {
            field: "prev_hash",
            source,
        })?;
        let body_hash = Hash256::from_hex(&self.body_hash).map_err(|source| BlockDtoError::Hash {
            field: "body_hash",
            source,
        })?;
        let body = hex::decode(&self.body).map_err(|_| BlockDtoError::BodyHex)?;
        Ok(Block::from_parts(self.index, prev, body_hash, self.time, body)?)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "index": self.index,
            "prev_hash": self.prev_hash,
            "body_hash": self.body_hash,
            "time": self.time,
            "body": self.body,
        })
    }
}

impl From<&Block> for BlockDto {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            prev_hash: block.prev_header_hash.to_hex(),
            body_hash: block.body_hash.to_hex(),
            time: block.created_at,
            body: hex::encode(&block.body),
        }
    }
}

/// JSON array of blocks, as returned by `get_blocks`.
pub fn blocks_to_json(blocks: &[Block]) -> Value {
    Value::Array(blocks.iter().map(|b| BlockDto::from(b).to_json()).collect())
}

/// Parses the `get_blocks` payload.
pub fn blocks_from_json(value: Value) -> Result<Vec<Block>, String> {
    let dtos: Vec<BlockDto> = serde_json::from_value(value).map_err(|e| e.to_string())?;
    dtos.into_iter()
        .map(|dto| dto.into_block().map_err(|e| e.to_string()))
        .collect()
}
