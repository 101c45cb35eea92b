//! Coordinator configuration.

use std::time::Duration;

use cadence_queue::QueueConfig;
use cadence_session::{RelegationPolicy, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Every tunable of the match cycle.
///
/// `Default` gives the production values: 5 minute matches, 2 minute
/// intermissions, and a full reset once a day. Tests and demos shrink the
/// durations.
///
/// ```text
///   boot ─→ Intermission ──(≥ min players)──→ ActiveMatch
///              ↑   │                               │
///              │   └─(too few: extend)─┐           │
///              │←──────────────────────┘           │
///              └──────────(match timer)────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// How long a match runs before it is ended.
    pub match_duration: Duration,

    /// Pause between matches. Also the re-check interval while too few
    /// players are queued.
    pub intermission_duration: Duration,

    /// Time from boot until the epoch is wiped and rebooted.
    pub reset_interval: Duration,

    /// Quiet period between wiping an epoch and booting the next one.
    pub reset_pause: Duration,

    /// A match only starts with at least this many queued players.
    pub min_match_players: usize,

    /// At most this many players take part in one match.
    pub max_match_players: usize,

    /// Queue capacity.
    pub max_queue_size: usize,

    /// Bottom-performer rule and relegation floor.
    pub relegation: RelegationPolicy,

    /// Disconnected sessions older than this are purged by the
    /// maintenance tick.
    pub stale_session_cutoff: Duration,

    /// Per-session performance entries kept.
    pub performance_history_len: usize,

    /// Finished matches kept for [`match_history`](crate::CoordinatorHandle::match_history).
    pub match_history_len: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            match_duration: Duration::from_secs(5 * 60),
            intermission_duration: Duration::from_secs(2 * 60),
            reset_interval: Duration::from_secs(24 * 60 * 60),
            reset_pause: Duration::from_secs(2),
            min_match_players: 2,
            max_match_players: 16,
            max_queue_size: 50,
            relegation: RelegationPolicy::default(),
            stale_session_cutoff: Duration::from_secs(5 * 60),
            performance_history_len: 10,
            match_history_len: 100,
        }
    }
}

impl CycleConfig {
    /// Shortest match or intermission the coordinator will arm. Anything
    /// shorter would let the extension loop spin.
    pub const MIN_PHASE_DURATION: Duration = Duration::from_millis(100);

    /// Returns a copy with inconsistent values clamped.
    ///
    /// - match and intermission durations raised to [`Self::MIN_PHASE_DURATION`]
    /// - `min_match_players` at least 1
    /// - `max_match_players` at least `min_match_players`
    /// - `performance_history_len` at least 1
    pub fn validated(mut self) -> Self {
        if self.match_duration < Self::MIN_PHASE_DURATION {
            warn!(
                match_ms = self.match_duration.as_millis() as u64,
                "match_duration below minimum, clamping"
            );
            self.match_duration = Self::MIN_PHASE_DURATION;
        }
        if self.intermission_duration < Self::MIN_PHASE_DURATION {
            warn!(
                intermission_ms = self.intermission_duration.as_millis() as u64,
                "intermission_duration below minimum, clamping"
            );
            self.intermission_duration = Self::MIN_PHASE_DURATION;
        }
        if self.min_match_players == 0 {
            warn!("min_match_players is 0, using 1");
            self.min_match_players = 1;
        }
        if self.max_match_players < self.min_match_players {
            warn!(
                min = self.min_match_players,
                max = self.max_match_players,
                "max_match_players below min_match_players, raising"
            );
            self.max_match_players = self.min_match_players;
        }
        if self.performance_history_len == 0 {
            warn!("performance_history_len is 0, using 1");
            self.performance_history_len = 1;
        }
        self
    }

    /// Settings for the session store.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            performance_history_len: self.performance_history_len,
            relegation: self.relegation.clone(),
        }
    }

    /// Settings for the matchmaking queue.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_size: self.max_queue_size,
            min_match_players: self.min_match_players,
            max_match_players: self.max_match_players,
            cycle_duration: self.match_duration + self.intermission_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_config_default() {
        let config = CycleConfig::default();
        assert_eq!(config.match_duration, Duration::from_secs(300));
        assert_eq!(config.intermission_duration, Duration::from_secs(120));
        assert_eq!(config.reset_interval, Duration::from_secs(86_400));
        assert_eq!(config.reset_pause, Duration::from_secs(2));
        assert_eq!(config.min_match_players, 2);
        assert_eq!(config.max_match_players, 16);
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.relegation.threshold, 3);
        assert_eq!(config.relegation.min_players, 4);
        assert_eq!(config.match_history_len, 100);
    }

    #[test]
    fn test_validated_defaults_unchanged() {
        let config = CycleConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_validated_clamps_zero_durations() {
        let config = CycleConfig {
            match_duration: Duration::ZERO,
            intermission_duration: Duration::from_millis(1),
            ..CycleConfig::default()
        }
        .validated();
        assert_eq!(config.match_duration, CycleConfig::MIN_PHASE_DURATION);
        assert_eq!(config.intermission_duration, CycleConfig::MIN_PHASE_DURATION);
    }

    #[test]
    fn test_validated_raises_max_to_min() {
        let config = CycleConfig {
            min_match_players: 6,
            max_match_players: 4,
            ..CycleConfig::default()
        }
        .validated();
        assert_eq!(config.max_match_players, 6);
    }

    #[test]
    fn test_queue_config_cycle_is_match_plus_intermission() {
        let config = CycleConfig::default();
        let queue = config.queue_config();
        assert_eq!(queue.cycle_duration, Duration::from_secs(420));
        assert_eq!(queue.max_size, 50);
    }

    #[test]
    fn test_session_config_carries_policy() {
        let config = CycleConfig {
            performance_history_len: 4,
            ..CycleConfig::default()
        };
        let session = config.session_config();
        assert_eq!(session.performance_history_len, 4);
        assert_eq!(session.relegation, RelegationPolicy::default());
    }
}
