use std::time::Duration;

use crate::world::{DEFAULT_INTERPOLATION_DELAY_MS, DEFAULT_SNAPSHOT_HORIZON_MS};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Ping cadence while connected and foregrounded.
    pub heartbeat_interval: Duration,
    /// Ping cadence while backgrounded; wider to conserve battery.
    pub background_heartbeat_interval: Duration,
    /// How long a liveness probe may go unanswered before the attempt is
    /// treated as failed.
    pub probe_timeout: Duration,
    /// Linear backoff base; the delay before attempt `n` is `base * n`.
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub interpolation_delay_ms: u64,
    pub snapshot_horizon_ms: u64,
    /// Send attempts per queued outbound message before it is dropped.
    pub max_send_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            background_heartbeat_interval: Duration::from_secs(45),
            probe_timeout: Duration::from_secs(5),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            interpolation_delay_ms: DEFAULT_INTERPOLATION_DELAY_MS,
            snapshot_horizon_ms: DEFAULT_SNAPSHOT_HORIZON_MS,
            max_send_attempts: 3,
        }
    }
}
