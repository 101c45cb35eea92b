//! Queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity and cohort bounds for the matchmaking queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of waiting sessions.
    pub max_size: usize,

    /// A match is only started when at least this many are waiting.
    pub min_match_players: usize,

    /// At most this many sessions are taken per match.
    pub max_match_players: usize,

    /// Length of one match plus one intermission, used for wait estimates.
    pub cycle_duration: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            min_match_players: 2,
            max_match_players: 16,
            cycle_duration: Duration::from_secs(5 * 60 + 2 * 60),
        }
    }
}
