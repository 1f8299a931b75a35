//! Process-local state holders.
//!
//! This module provides the two pieces of mutable state a node owns:
//!
//! - the in-memory chain ([`ledger::Ledger`]),
//! - the set of known peers ([`peers::PeerRegistry`]).
//!
//! Neither is persisted; both live for the lifetime of the process.

pub mod ledger;
pub mod peers;

pub use ledger::{Ledger, LedgerError, Rejected};
pub use peers::{AlreadyPresent, PeerRegistry};
