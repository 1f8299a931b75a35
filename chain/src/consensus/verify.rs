//! Chain integrity checks.
//!
//! A chain is valid when, for every block at position `i`:
//!
//! 1. (`i > 0`) its `prev_header_hash` is the header hash of block `i - 1`,
//! 2. its `body_hash` is the SHA-256 of its body,
//! 3. its `index` equals `i`,
//! 4. (`i > 0`) its `created_at` is not earlier than that of block `i - 1`.
//!
//! The checks are pure functions over borrowed blocks, so they can run on
//! snapshots from any number of tasks at once.

use crate::types::{Block, Hash256};

use super::error::VerificationFailure;

/// Verifies a whole chain, scanning from genesis upward.
///
/// Returns the first failure found. An empty chain is valid.
pub fn verify_chain(chain: &[Block]) -> Result<(), VerificationFailure> {
    let mut prev: Option<&Block> = None;
    for (position, block) in chain.iter().enumerate() {
        verify_link(prev, block, position)?;
        prev = Some(block);
    }
    Ok(())
}

/// Checks a single block against its predecessor (if any).
///
/// Rules are applied in the order listed at module level so that a block
/// breaking several of them always reports the same failure.
fn verify_link(
    prev: Option<&Block>,
    block: &Block,
    position: usize,
) -> Result<(), VerificationFailure> {
    if let Some(prev) = prev {
        if prev.header_hash() != block.prev_header_hash {
            return Err(VerificationFailure::HashMismatch { index: position });
        }
    }

    if Hash256::compute(&block.body) != block.body_hash {
        return Err(VerificationFailure::BodyHashMismatch { index: position });
    }

    if block.index as usize != position {
        return Err(VerificationFailure::IndexMismatch {
            index: block.index,
            expected: position,
        });
    }

    if let Some(prev) = prev {
        if block.created_at < prev.created_at {
            return Err(VerificationFailure::TimeOrderViolation { index: position });
        }
    }

    Ok(())
}
