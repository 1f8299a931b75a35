//! Node-to-node networking.
//!
//! - [`framing`]: length-prefixed frames over any async byte stream,
//! - [`rpc`]: the JSON request/response schema carried in frames,
//! - [`client`]: outbound requests ([`PeerClient`]),
//! - [`server`]: the inbound listener and request dispatch,
//! - [`sync`]: the periodic longest-chain loop,
//! - [`discovery`]: startup bootstrap and block broadcast.

pub mod client;
pub mod discovery;
pub mod framing;
pub mod rpc;
pub mod server;
pub mod state;
pub mod sync;

pub use client::{PeerClient, PeerError};
pub use discovery::{bootstrap, broadcast_block};
pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use rpc::{BlockDto, ProtocolViolation, Request, Response};
pub use server::{NodeError, NodeServer, dispatch, handle_payload};
pub use state::{NodeState, SharedState};
pub use sync::SyncLoop;
