//! Clock helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix timestamp in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
