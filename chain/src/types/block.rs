// chain/src/types/block.rs

//! Block record, header hashing and the binary codec.
//!
//! A block is serialized as a fixed 80-byte prefix followed by the body:
//!
//! | Offset | Size | Field                     |
//! |--------|------|---------------------------|
//! | 0      | 4    | body length               |
//! | 4      | 4    | block index               |
//! | 8      | 32   | previous block header hash|
//! | 40     | 32   | body hash                 |
//! | 72     | 8    | creation time (seconds)   |
//! | 80     | N    | body bytes                |
//!
//! All integers are **little-endian** and there is no padding. The 76 bytes
//! at `[4..80)` are the *header*; its SHA-256 digest is what the following
//! block stores in `prev_header_hash`. The body-length prefix is only there
//! for self-description and is not covered by the header hash.

use thiserror::Error;

use super::{HASH_LEN, Hash256};

/// Size of the body-length prefix.
pub const BODY_LEN_SIZE: usize = 4;

/// Size of the hashed header: index + prev hash + body hash + timestamp.
pub const HEADER_LEN: usize = 4 + HASH_LEN + HASH_LEN + 8;

/// Size of everything that precedes the body in an encoded block.
pub const BLOCK_PREFIX_LEN: usize = BODY_LEN_SIZE + HEADER_LEN;

/// Body of the genesis block every node starts from.
pub const GENESIS_BODY: &[u8] = b"Genesis block";

/// Structural decode-time failure of an encoded block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedBlock {
    #[error("block is {len} bytes, shorter than the 80-byte fixed prefix")]
    Truncated { len: usize },
    #[error("block declares a {declared}-byte body but {actual} bytes follow the header")]
    BodyLengthMismatch { declared: u32, actual: usize },
    #[error("body of {len} bytes does not fit the 32-bit length field")]
    BodyTooLarge { len: usize },
}

/// A single ledger entry: a hashed header plus an opaque body.
///
/// `body_hash` is stored rather than derived so that blocks received from
/// peers keep whatever hash they were sent with; the chain verifier is what
/// decides whether it matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Position in the chain, 0 for genesis.
    pub index: u32,
    /// SHA-256 of the previous block's header; all zeroes for genesis.
    pub prev_header_hash: Hash256,
    /// SHA-256 of `body`.
    pub body_hash: Hash256,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: u64,
    /// Opaque payload.
    pub body: Vec<u8>,
}

impl Block {
    /// Builds a block over `body`, computing its body hash.
    pub fn new(
        index: u32,
        prev_header_hash: Hash256,
        created_at: u64,
        body: Vec<u8>,
    ) -> Result<Self, MalformedBlock> {
        let body_hash = Hash256::compute(&body);
        Self::from_parts(index, prev_header_hash, body_hash, created_at, body)
    }

    /// Assembles a block from already-known fields without recomputing
    /// anything. Only the body size is checked.
    pub fn from_parts(
        index: u32,
        prev_header_hash: Hash256,
        body_hash: Hash256,
        created_at: u64,
        body: Vec<u8>,
    ) -> Result<Self, MalformedBlock> {
        checked_body_len(body.len())?;
        Ok(Self {
            index,
            prev_header_hash,
            body_hash,
            created_at,
            body,
        })
    }

    /// The fixed genesis block shared by every node.
    pub fn genesis() -> Self {
        Self {
            index: 0,
            prev_header_hash: Hash256::ZERO,
            body_hash: Hash256::compute(GENESIS_BODY),
            created_at: 0,
            body: GENESIS_BODY.to_vec(),
        }
    }

    /// The 76 header bytes that are hashed to link the next block.
    pub fn header_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.index.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_header_hash.as_bytes());
        out[36..68].copy_from_slice(self.body_hash.as_bytes());
        out[68..76].copy_from_slice(&self.created_at.to_le_bytes());
        out
    }

    /// SHA-256 of [`Block::header_bytes`].
    pub fn header_hash(&self) -> Hash256 {
        Hash256::compute(&self.header_bytes())
    }

    /// Serializes this block in the wire layout described at module level.
    ///
    /// Fails with [`MalformedBlock::BodyTooLarge`] if the body no longer fits
    /// the length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, MalformedBlock> {
        let body_len = checked_body_len(self.body.len())?;
        Ok(write_block(body_len, &self.header_bytes(), &self.body))
    }
}

/// Encodes a fresh block, computing `body_hash = SHA-256(body)`.
pub fn encode(
    index: u32,
    prev_header_hash: &Hash256,
    created_at: u64,
    body: &[u8],
) -> Result<Vec<u8>, MalformedBlock> {
    let body_len = checked_body_len(body.len())?;
    let block = Block {
        index,
        prev_header_hash: *prev_header_hash,
        body_hash: Hash256::compute(body),
        created_at,
        body: Vec::new(),
    };
    Ok(write_block(body_len, &block.header_bytes(), body))
}

/// Length prefix for a body of `len` bytes, shared by every encode path.
fn checked_body_len(len: usize) -> Result<u32, MalformedBlock> {
    u32::try_from(len).map_err(|_| MalformedBlock::BodyTooLarge { len })
}

fn write_block(body_len: u32, header: &[u8; HEADER_LEN], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOCK_PREFIX_LEN + body.len());
    out.extend_from_slice(&body_len.to_le_bytes());
    out.extend_from_slice(header);
    out.extend_from_slice(body);
    out
}

/// Decodes a block from its wire layout.
///
/// Only the structure is checked: the input must hold the full 80-byte
/// prefix and exactly as many body bytes as the prefix declares. Hash
/// linkage and body integrity are left to the chain verifier.
pub fn decode(bytes: &[u8]) -> Result<Block, MalformedBlock> {
    if bytes.len() < BLOCK_PREFIX_LEN {
        return Err(MalformedBlock::Truncated { len: bytes.len() });
    }

    let declared = u32::from_le_bytes(array_at(bytes, 0));
    let body = &bytes[BLOCK_PREFIX_LEN..];
    if declared as usize != body.len() {
        return Err(MalformedBlock::BodyLengthMismatch {
            declared,
            actual: body.len(),
        });
    }

    Ok(Block {
        index: u32::from_le_bytes(array_at(bytes, 4)),
        prev_header_hash: Hash256(array_at(bytes, 8)),
        body_hash: Hash256(array_at(bytes, 40)),
        created_at: u64::from_le_bytes(array_at(bytes, 72)),
        body: body.to_vec(),
    })
}

/// Copies `N` bytes starting at `offset`. Callers check bounds beforehand.
fn array_at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prev() -> Hash256 {
        Hash256([7u8; HASH_LEN])
    }

    #[test]
    fn encode_decode_roundtrip_preserves_fields() {
        let bytes = encode(3, &sample_prev(), 1_700_000_123, b"payload").unwrap();
        let block = decode(&bytes).expect("well-formed block should decode");

        assert_eq!(block.index, 3);
        assert_eq!(block.prev_header_hash, sample_prev());
        assert_eq!(block.created_at, 1_700_000_123);
        assert_eq!(block.body, b"payload");
        assert_eq!(block.body_hash, Hash256::compute(b"payload"));
        assert_eq!(block.encode().unwrap(), bytes);
    }

    #[test]
    fn layout_matches_documented_offsets() {
        let bytes = encode(0x0102_0304, &sample_prev(), 0x1122_3344_5566_7788, b"xyz").unwrap();

        assert_eq!(bytes.len(), BLOCK_PREFIX_LEN + 3);
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..40], sample_prev().as_bytes());
        assert_eq!(&bytes[40..72], Hash256::compute(b"xyz").as_bytes());
        assert_eq!(&bytes[72..80], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[80..], b"xyz");
    }

    #[test]
    fn header_hash_covers_bytes_4_to_80_only() {
        let bytes = encode(9, &sample_prev(), 42, b"body").unwrap();
        let block = decode(&bytes).unwrap();

        assert_eq!(block.header_bytes().as_slice(), &bytes[4..80]);
        assert_eq!(block.header_hash(), Hash256::compute(&bytes[4..80]));
    }

    #[test]
    fn empty_body_is_allowed() {
        let block = Block::new(1, Hash256::ZERO, 0, Vec::new()).unwrap();
        let bytes = block.encode().unwrap();
        assert_eq!(&bytes[0..4], &0u32.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap(), block);
    }

    #[test]
    fn decode_rejects_input_shorter_than_prefix() {
        let bytes = encode(1, &sample_prev(), 5, b"abc").unwrap();
        let err = decode(&bytes[..79]).unwrap_err();
        assert_eq!(err, MalformedBlock::Truncated { len: 79 });
    }

    #[test]
    fn decode_rejects_body_length_mismatch() {
        let mut bytes = encode(1, &sample_prev(), 5, b"abc").unwrap();
        bytes.push(b'!');
        let err = decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            MalformedBlock::BodyLengthMismatch {
                declared: 3,
                actual: 4
            }
        );
    }

    #[test]
    fn decode_does_not_check_body_hash() {
        let mut bytes = encode(1, &sample_prev(), 5, b"abc").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let block = decode(&bytes).expect("decode is structural only");
        assert_ne!(block.body_hash, Hash256::compute(&block.body));
    }

    #[test]
    fn length_prefix_is_checked_not_saturated() {
        let max = u32::MAX as usize;
        assert_eq!(checked_body_len(max), Ok(u32::MAX));
        assert_eq!(
            checked_body_len(max + 1),
            Err(MalformedBlock::BodyTooLarge { len: max + 1 })
        );
    }

    #[test]
    fn block_encode_and_free_encode_agree() {
        let block = Block::new(4, sample_prev(), 77, b"same".to_vec()).unwrap();
        assert_eq!(
            block.encode().unwrap(),
            encode(4, &sample_prev(), 77, b"same").unwrap()
        );
    }

    #[test]
    fn genesis_is_fixed() {
        let g = Block::genesis();
        assert_eq!(g.index, 0);
        assert_eq!(g.prev_header_hash, Hash256::ZERO);
        assert_eq!(g.created_at, 0);
        assert_eq!(g.body, GENESIS_BODY);
        assert_eq!(g, Block::new(0, Hash256::ZERO, 0, GENESIS_BODY.to_vec()).unwrap());
        assert_eq!(g.header_hash(), Block::genesis().header_hash());
    }
}
