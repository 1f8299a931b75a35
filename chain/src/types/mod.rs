//! Core domain types used by the ledger.
//!
//! This module defines the strongly-typed hash, the block record with its
//! binary codec, and the peer address type that are shared across the
//! implementation. The goal is to avoid "naked" byte buffers and address
//! strings in public APIs and instead use domain-specific newtypes.

use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Block record, header hashing and the binary codec.
pub mod block;
/// `host:port` peer addresses.
pub mod peer;

pub use block::{
    BLOCK_PREFIX_LEN, Block, GENESIS_BODY, HEADER_LEN, MalformedBlock, decode, encode,
};
pub use peer::{InvalidPeerAddress, Peer};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (SHA-256).
///
/// Used for both the header link (`prev_header_hash`) and the body digest
/// (`body_hash`) of a block. It is always exactly [`HASH_LEN`] bytes long.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero hash, used as the genesis block's previous-header link.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LEN]);

    /// Computes a new [`Hash256`] as the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Hash256(Sha256::digest(data).into())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lower-case hex encoding, as used in RPC messages and logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string into a hash.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s).map_err(|_| HashParseError::InvalidHex)?;
        let arr: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| HashParseError::WrongLength(b.len()))?;
        Ok(Hash256(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Failure to parse a hex-encoded [`Hash256`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("expected a 32-byte hash, got {0} bytes")]
    WrongLength(usize),
}
