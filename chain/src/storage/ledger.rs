//! In-memory ledger.
//!
//! The ledger owns the adopted chain for the lifetime of the process. It
//! starts from the genesis block and grows by local appends, by blocks
//! pushed from peers, or by wholesale replacement when synchronisation
//! finds a longer valid chain. Nothing is written to disk.

use thiserror::Error;

use crate::clock::unix_seconds;
use crate::consensus::error::VerificationFailure;
use crate::consensus::verify::verify_chain;
use crate::types::{Block, Hash256, MalformedBlock};

/// Local append failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The new block would be timestamped before the current head, which
    /// the verifier rejects. Appending resumes once the clock catches up.
    #[error("clock reads {now}s but the head block was created at {head}s")]
    ClockBehindHead { head: u64, now: u64 },
    /// The chain already holds `u32::MAX + 1` blocks.
    #[error("block index space exhausted")]
    IndexExhausted,
    #[error(transparent)]
    Malformed(#[from] MalformedBlock),
}

/// A peer-supplied block that would have broken the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("block rejected: {0}")]
pub struct Rejected(pub VerificationFailure);

/// Ordered, hash-linked sequence of blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Creates a ledger holding only the genesis block.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the ledger holds no blocks at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Latest block, if any.
    pub fn head(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Block at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Borrowed view of the chain.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Appends `body` as a new block stamped with the current time.
    pub fn append(&mut self, body: impl Into<Vec<u8>>) -> Result<Block, LedgerError> {
        self.append_at(body, unix_seconds())
    }

    /// Appends `body` as a new block stamped with `created_at`.
    ///
    /// The block links to the head's header hash and takes the next index.
    /// A timestamp earlier than the head's is refused rather than clamped.
    pub fn append_at(
        &mut self,
        body: impl Into<Vec<u8>>,
        created_at: u64,
    ) -> Result<Block, LedgerError> {
        let (prev_hash, head_time) = match self.blocks.last() {
            Some(head) => (head.header_hash(), head.created_at),
            None => (Hash256::ZERO, 0),
        };
        if created_at < head_time {
            return Err(LedgerError::ClockBehindHead {
                head: head_time,
                now: created_at,
            });
        }
        let index = u32::try_from(self.blocks.len()).map_err(|_| LedgerError::IndexExhausted)?;

        let block = Block::new(index, prev_hash, created_at, body.into())?;
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Appends a block received from a peer.
    ///
    /// The block is pushed speculatively and the whole chain re-verified;
    /// on failure the block is popped again and the reason returned.
    pub fn accept_external(&mut self, block: Block) -> Result<(), Rejected> {
        self.blocks.push(block);
        if let Err(failure) = verify_chain(&self.blocks) {
            self.blocks.pop();
            return Err(Rejected(failure));
        }
        Ok(())
    }

    /// Replaces the whole chain. Callers are expected to have verified it.
    pub fn import(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
    }

    /// Returns an owned copy of the chain, unaffected by later mutation.
    pub fn export(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    /// Verifies the current chain.
    pub fn verify(&self) -> Result<(), VerificationFailure> {
        verify_chain(&self.blocks)
    }

    /// Swaps in `candidate` if it is strictly longer than the current chain.
    ///
    /// The length check is repeated here because the local chain may have
    /// grown while the candidate was being fetched.
    pub fn replace_if_longer(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() > self.blocks.len() {
            self.blocks = candidate;
            true
        } else {
            false
        }
    }
}
