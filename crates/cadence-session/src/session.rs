//! Session types: the data structures that represent one player.
//!
//! A "session" is the server's record of a player for the current epoch:
//! - WHO they are (`SessionId`, and a handle once claimed)
//! - WHERE they are in the match cycle (`LifecycleState`)
//! - HOW they have been doing (bounded performance history + streak)
//! - WHETHER they are connected right now

use std::collections::VecDeque;
use std::fmt;

use cadence_protocol::{ConnectionId, MatchId, SessionId};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::RelegationPolicy;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How many recent match outcomes to keep per session. Oldest evicted
    /// first.
    pub performance_history_len: usize,

    /// When sustained poor performance leads to relegation.
    pub relegation: RelegationPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            performance_history_len: 10,
            relegation: RelegationPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Where a session is in the match cycle.
///
/// ```text
///   New ──join──→ Queued ──selected──→ Active ──match ends──→ Queued
///    ↑              │                    │
///    └────leave─────┘                    └──poor streak──→ Relegated
/// ```
///
/// Relegated is terminal for the epoch: the store refuses to move a
/// relegated session anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    New,
    Queued,
    Active,
    Relegated,
}

impl LifecycleState {
    /// Queued or Active: the session is taking part in the cycle.
    pub fn is_in_cycle(&self) -> bool {
        matches!(self, Self::Queued | Self::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Queued => write!(f, "QUEUED"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Relegated => write!(f, "RELEGATED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// One match outcome in a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub match_id: MatchId,
    pub rank: u32,
    pub score: i64,
    pub total_players: usize,
    /// Whether the bottom-performer rule classified this result as poor.
    pub poor: bool,
    /// Unix milliseconds.
    pub recorded_at: u64,
}

/// Snapshot taken at the moment a session is relegated, for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelegationRecord {
    pub session_id: SessionId,
    pub handle: Option<String>,
    pub relegation_streak: u32,
    pub total_matches_played: u32,
    /// Unix milliseconds.
    pub relegated_at: u64,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single player's record for the current epoch.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,

    /// `None` while the player is disconnected.
    pub connection_id: Option<ConnectionId>,

    /// Set once by a successful claim, never changed afterwards.
    pub handle: Option<String>,

    pub state: LifecycleState,

    /// Most recent outcomes, oldest at the front.
    pub performance_history: VecDeque<PerformanceEntry>,

    /// Consecutive poor results. Any non-poor result resets it to 0.
    pub relegation_streak: u32,

    pub total_matches_played: u32,

    pub joined_at: Instant,

    /// Bumped by every mutation.
    pub last_active_at: Instant,

    /// When the connection was lost. Stale cleanup measures from here, so
    /// bookkeeping on a disconnected session never restarts the clock.
    pub disconnected_at: Option<Instant>,
}

impl Session {
    pub(crate) fn new(session_id: SessionId, connection_id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            connection_id: Some(connection_id),
            handle: None,
            state: LifecycleState::New,
            performance_history: VecDeque::new(),
            relegation_streak: 0,
            total_matches_played: 0,
            joined_at: now,
            last_active_at: now,
            disconnected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_id.is_some()
    }

    pub fn is_relegated(&self) -> bool {
        self.state == LifecycleState::Relegated
    }

    pub(crate) fn touch(&mut self) {
        self.last_active_at = Instant::now();
    }

    pub(crate) fn unlink(&mut self) {
        self.connection_id = None;
        self.disconnected_at = Some(Instant::now());
        self.touch();
    }

    pub(crate) fn link(&mut self, connection_id: ConnectionId) {
        self.connection_id = Some(connection_id);
        self.disconnected_at = None;
        self.touch();
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Session counts by connectivity and lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: usize,
    pub connected: usize,
    pub disconnected: usize,
    pub new: usize,
    pub queued: usize,
    pub active: usize,
    pub relegated: usize,
}
