use std::time::Duration;

/// Timing parameters for chain synchronisation and peer traffic.
///
/// Every outbound call to a peer is bounded by `peer_timeout`, so one slow
/// or dead peer delays a round by at most that much.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Delay between two longest-chain resolution rounds.
    pub interval: Duration,
    /// Upper bound on one outbound request (connect + send + receive).
    pub peer_timeout: Duration,
    /// Upper bound on reading an inbound request from a client.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}
