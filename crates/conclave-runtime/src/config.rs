//! Orchestrator tunables.

use std::time::Duration;

/// Tunables for session orchestration.
///
/// The defaults match the deployed values; tests shrink the timers.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often moderator presence is verified.
    pub presence_interval: Duration,
    /// Maximum tolerated gap since a moderator's last presence
    /// attestation before they are ejected.
    pub presence_max_lag: chrono::Duration,
    /// Session lifetime when the creator does not pick one.
    pub default_expiry: chrono::Duration,
    /// Bytes of recent output replayed to newly joining parties.
    pub history_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_secs(15),
            presence_max_lag: chrono::Duration::seconds(60),
            default_expiry: chrono::Duration::hours(24),
            history_size: 1024,
        }
    }
}
