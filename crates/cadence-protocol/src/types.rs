//! Core types shared across the Cadence workspace.
//!
//! Anything that leaves the coordinator: a notification, a snapshot, a
//! match record: is built from these types, so all of them derive
//! `Serialize`/`Deserialize`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier of a player session.
///
/// Sessions are created by the session store on connect; the string is
/// whatever the store generated and callers should treat it as opaque.
/// `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an already-generated id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a transport connection, assigned by the gateway.
///
/// A session outlives its connections: a player who drops and comes back
/// gets a new `ConnectionId` but keeps the same [`SessionId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of a match.
///
/// `seq` restarts at 1 every epoch; pairing it with the epoch number keeps
/// ids distinct across server resets and totally ordered within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId {
    /// Epoch the match was played in (starts at 1, bumped by every reset).
    pub epoch: u64,
    /// Position of the match within its epoch (starts at 1).
    pub seq: u64,
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}.{}", self.epoch, self.seq)
    }
}

// ---------------------------------------------------------------------------
// Phase: the global state machine
// ---------------------------------------------------------------------------

/// The global phase of the match cycle.
///
/// ```text
/// ServerStart ──boot──→ Intermission ⇄ ActiveMatch
///      ↑                                   │
///      └──────────── server reset ─────────┘ (from any phase)
/// ```
///
/// Only the coordinator changes the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Transient: entered at boot and after a reset, left as soon as the
    /// lifecycle timers are armed.
    ServerStart,
    /// Waiting between matches while the queue fills.
    Intermission,
    /// A match is running.
    ActiveMatch,
}

impl Phase {
    /// Returns `true` if match results may be recorded in this phase.
    pub fn accepts_results(&self) -> bool {
        matches!(self, Self::ActiveMatch)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerStart => write!(f, "SERVER_START"),
            Self::Intermission => write!(f, "INTERMISSION"),
            Self::ActiveMatch => write!(f, "ACTIVE_MATCH"),
        }
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// One participant's outcome, as reported by the scoring collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantResult {
    pub session_id: SessionId,
    /// 1 = best.
    pub rank: u32,
    pub score: i64,
}

/// A match, running or archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    /// Unix milliseconds.
    pub started_at: u64,
    /// Unix milliseconds; `None` while the match is running.
    pub ended_at: Option<u64>,
    /// Fixed when the match starts and never changed afterwards.
    pub participants: Vec<SessionId>,
    /// Set exactly once by result recording.
    pub results: Option<Vec<ParticipantResult>>,
}

impl MatchRecord {
    /// Creates a running match with no results yet.
    pub fn new(match_id: MatchId, started_at: u64, participants: Vec<SessionId>) -> Self {
        Self {
            match_id,
            started_at,
            ended_at: None,
            participants,
            results: None,
        }
    }

    /// Whether `session_id` was selected into this match.
    pub fn is_participant(&self, session_id: &SessionId) -> bool {
        self.participants.contains(session_id)
    }

    /// Whether the match timer has already ended this match.
    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// The closed set of things observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    PhaseChanged,
    MatchStarted,
    MatchEnded,
    PlayerRelegated,
    ServerReset,
}

impl NotificationKind {
    /// Every kind, in declaration order.
    pub const ALL: [NotificationKind; 5] = [
        Self::PhaseChanged,
        Self::MatchStarted,
        Self::MatchEnded,
        Self::PlayerRelegated,
        Self::ServerReset,
    ];
}

/// A notification emitted by the coordinator.
///
/// Each payload is plain data. Nothing here is tied to a transport.
/// `#[serde(tag = "type")]` produces `{ "type": "MatchEnded", ... }`, which
/// is easy to switch on from a JavaScript client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    PhaseChanged {
        new_phase: Phase,
        timestamp: u64,
    },
    MatchStarted {
        match_record: MatchRecord,
        timestamp: u64,
    },
    MatchEnded {
        match_record: MatchRecord,
        timestamp: u64,
    },
    PlayerRelegated {
        session_id: SessionId,
        handle: Option<String>,
        relegation_streak: u32,
        timestamp: u64,
    },
    ServerReset {
        timestamp: u64,
        uptime_ms: u64,
        total_matches: u64,
    },
}

impl Notification {
    /// The kind used to route this notification to listeners.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::PhaseChanged { .. } => NotificationKind::PhaseChanged,
            Self::MatchStarted { .. } => NotificationKind::MatchStarted,
            Self::MatchEnded { .. } => NotificationKind::MatchEnded,
            Self::PlayerRelegated { .. } => NotificationKind::PlayerRelegated,
            Self::ServerReset { .. } => NotificationKind::ServerReset,
        }
    }

    /// Unix-millisecond timestamp carried by every payload.
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::PhaseChanged { timestamp, .. }
            | Self::MatchStarted { timestamp, .. }
            | Self::MatchEnded { timestamp, .. }
            | Self::PlayerRelegated { timestamp, .. }
            | Self::ServerReset { timestamp, .. } => *timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A sequenced notification, ready for a transport to broadcast.
///
/// `seq` lets clients detect gaps after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    /// Unix milliseconds at the time the envelope was built.
    pub timestamp: u64,
    pub notification: Notification,
}

/// Current wall-clock time in unix milliseconds.
///
/// Falls back to 0 if the system clock is set before 1970.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================
