use thiserror::Error;

/// Chain-integrity violation found by the verifier.
///
/// Every variant carries the position of the offending block so callers can
/// report it; the scan stops at the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// `prev_header_hash` does not match the header hash of the block before.
    #[error("block {index} does not link to the header of its predecessor")]
    HashMismatch { index: usize },
    /// `body_hash` does not match the SHA-256 of the body.
    #[error("block {index} body does not match its body hash")]
    BodyHashMismatch { index: usize },
    /// The block claims a different index than its position in the chain.
    #[error("block at position {expected} claims index {index}")]
    IndexMismatch { index: u32, expected: usize },
    /// The block was created before its predecessor.
    #[error("block {index} is timestamped before its predecessor")]
    TimeOrderViolation { index: usize },
}

impl VerificationFailure {
    /// Position in the chain of the block that failed.
    pub fn position(&self) -> usize {
        match *self {
            VerificationFailure::HashMismatch { index }
            | VerificationFailure::BodyHashMismatch { index }
            | VerificationFailure::TimeOrderViolation { index } => index,
            VerificationFailure::IndexMismatch { expected, .. } => expected,
        }
    }
}

/// Reason a peer's chain was passed over during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateRejected {
    /// The peer advertised one length and served another.
    #[error("peer claimed {claimed} blocks but served {served}")]
    LengthMismatch { claimed: usize, served: usize },
    /// The served chain is not internally consistent.
    #[error("served chain is invalid: {0}")]
    Invalid(#[from] VerificationFailure),
    /// The served chain starts from a different genesis block.
    #[error("served chain starts from a foreign genesis block")]
    ForeignGenesis,
}
