//! Chain integrity and longest-chain consensus.
//!
//! This module provides:
//!
//! - the chain verifier ([`verify::verify_chain`]),
//! - the failure taxonomy it reports ([`error::VerificationFailure`]),
//! - the longest-chain resolver over a pluggable [`resolver::ChainSource`],
//! - sync timing parameters ([`config::SyncConfig`]).

pub mod config;
pub mod error;
pub mod resolver;
pub mod verify;

pub use config::SyncConfig;
pub use error::{CandidateRejected, VerificationFailure};
pub use resolver::{ChainSource, LongestChainResolver, Resolution};
pub use verify::verify_chain;
