//! Peer addresses.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A `host:port` address string that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid peer address `{0}`: expected host:port")]
pub struct InvalidPeerAddress(pub String);

/// Network address of a peer, kept in its `host:port` text form.
///
/// The host is not resolved here; it is handed to the socket layer as-is
/// at connect time. Parsing guarantees a non-empty host (IPv6 literals in
/// brackets) and a port that fits in 16 bits, written without leading
/// zeros.
///
/// Equality is textual: `localhost:5001` and `127.0.0.1:5001` are two
/// different peers even when they reach the same node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Peer(String);

impl Peer {
    /// The address as passed to `TcpStream::connect`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part of the address.
    pub fn host(&self) -> &str {
        self.split().0
    }

    /// Port part of the address.
    pub fn port(&self) -> u16 {
        self.split().1
    }

    fn split(&self) -> (&str, u16) {
        // Validated at construction.
        let (host, port) = self.0.rsplit_once(':').unwrap_or((self.0.as_str(), "0"));
        (host, port.parse().unwrap_or(0))
    }
}

impl FromStr for Peer {
    type Err = InvalidPeerAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || InvalidPeerAddress(s.to_string());

        let (host, port) = trimmed.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        // IPv6 literals must be bracketed, otherwise the port is ambiguous.
        let bracketed = host.starts_with('[') && host.ends_with(']');
        if host.contains(':') && !bracketed {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok(Peer(format!("{host}:{port}")))
    }
}

impl TryFrom<String> for Peer {
    type Error = InvalidPeerAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Peer> for String {
    fn from(peer: Peer) -> Self {
        peer.0
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Peer(addr.to_string())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
