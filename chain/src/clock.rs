//! Wall-clock helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
}

/// Returns the current wall-clock time as whole seconds since Unix epoch.
///
/// On error (system clock before epoch) this falls back to 0.
pub fn unix_seconds() -> u64 {
    since_epoch().as_secs()
}

/// Current time as fractional seconds, as carried in RPC responses.
pub fn unix_seconds_f64() -> f64 {
    since_epoch().as_secs_f64()
}
