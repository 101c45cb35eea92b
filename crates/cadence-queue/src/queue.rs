//! The FIFO matchmaking queue.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use cadence_protocol::SessionId;
use cadence_session::{LifecycleState, RelegationRecord, SessionStore};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{QueueConfig, QueueRejection};

/// One waiting session.
#[derive(Debug, Clone)]
struct QueueEntry {
    session_id: SessionId,
    handle: String,
    enqueued_at: Instant,
}

/// A queue entry as shown in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntryView {
    /// 1-based.
    pub position: usize,
    pub session_id: SessionId,
    pub handle: String,
    pub wait_ms: u64,
}

/// Full queue contents, front first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub size: usize,
    pub capacity: usize,
    pub entries: Vec<QueueEntryView>,
}

/// Utilization figures for the current epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub size: usize,
    pub capacity: usize,
    /// `size / capacity`, 0.0–1.0.
    pub utilization: f64,
    pub total_enqueued: u64,
    /// Sessions handed to a match by `select_for_match`.
    pub total_matched: u64,
    /// Wait of the entry at the front, if any.
    pub longest_wait_ms: u64,
}

/// Why a finisher was not put back in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequeueFailureReason {
    /// The relegation check caught the session; it is now Relegated.
    Relegated(RelegationRecord),
    /// The session is gone or has no live connection.
    Disconnected,
    /// The enqueue itself was refused (for example, the queue is full).
    Rejected(QueueRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeueFailure {
    pub session_id: SessionId,
    pub reason: RequeueFailureReason,
}

/// Result of [`MatchmakingQueue::requeue_after_match`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequeueOutcome {
    pub requeued: Vec<SessionId>,
    pub failed: Vec<RequeueFailure>,
}

impl RequeueOutcome {
    /// Relegations that happened during the requeue, in participant order.
    pub fn relegations(&self) -> impl Iterator<Item = &RelegationRecord> {
        self.failed.iter().filter_map(|f| match &f.reason {
            RequeueFailureReason::Relegated(record) => Some(record),
            _ => None,
        })
    }
}

/// Strict-FIFO waiting list of sessions eligible for the next match.
///
/// Every operation that checks membership or capacity also performs the
/// mutation under the same `&mut self` borrow, so there is no window in
/// which a duplicate or an overflow could slip in. The queue keeps
/// `LifecycleState::Queued` in the session store in step with its own
/// membership, which is why mutating methods take the store.
pub struct MatchmakingQueue {
    entries: VecDeque<QueueEntry>,
    /// Mirror of `entries` for O(1) membership checks.
    members: HashSet<SessionId>,
    config: QueueConfig,
    total_enqueued: u64,
    total_matched: u64,
}

impl MatchmakingQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            members: HashSet::new(),
            config,
            total_enqueued: 0,
            total_matched: 0,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Appends a session to the back of the queue.
    ///
    /// Returns the session's 1-based position on success.
    pub fn enqueue(
        &mut self,
        sessions: &mut SessionStore,
        session_id: &SessionId,
        handle: &str,
    ) -> Result<usize, QueueRejection> {
        let session = sessions
            .get(session_id)
            .filter(|s| s.is_connected())
            .ok_or_else(|| QueueRejection::InvalidSession(session_id.clone()))?;

        match session.state {
            LifecycleState::Relegated => {
                return Err(QueueRejection::SessionRelegated(session_id.clone()));
            }
            LifecycleState::Active => {
                return Err(QueueRejection::InMatch(session_id.clone()));
            }
            LifecycleState::Queued => {
                return Err(QueueRejection::AlreadyQueued(session_id.clone()));
            }
            LifecycleState::New => {}
        }
        if session.handle.as_deref() != Some(handle) {
            return Err(QueueRejection::HandleMismatch(session_id.clone()));
        }
        if self.members.contains(session_id) {
            return Err(QueueRejection::AlreadyQueued(session_id.clone()));
        }
        if self.entries.len() >= self.config.max_size {
            return Err(QueueRejection::QueueFull(self.config.max_size));
        }

        sessions
            .update_state(session_id, LifecycleState::Queued)
            .map_err(|_| QueueRejection::InvalidSession(session_id.clone()))?;

        self.entries.push_back(QueueEntry {
            session_id: session_id.clone(),
            handle: handle.to_string(),
            enqueued_at: Instant::now(),
        });
        self.members.insert(session_id.clone());
        self.total_enqueued += 1;

        let position = self.entries.len();
        tracing::info!(%session_id, handle, position, "session queued");
        Ok(position)
    }

    /// Removes a session from the queue and returns it to `New`.
    pub fn dequeue(&mut self, sessions: &mut SessionStore, session_id: &SessionId) -> bool {
        if !self.members.remove(session_id) {
            return false;
        }
        self.entries.retain(|e| e.session_id != *session_id);
        reset_to_new(sessions, session_id);
        tracing::info!(%session_id, "session left queue");
        true
    }

    /// Takes the next cohort from the front of the queue.
    ///
    /// Invalid entries are purged first. Returns an empty list if fewer
    /// than `min_match_players` remain; otherwise up to
    /// `max_match_players` sessions in FIFO order, all now `Active`.
    pub fn select_for_match(&mut self, sessions: &mut SessionStore) -> Vec<SessionId> {
        self.cleanup(sessions);

        if self.entries.len() < self.config.min_match_players {
            tracing::debug!(
                waiting = self.entries.len(),
                needed = self.config.min_match_players,
                "not enough players for a match"
            );
            return Vec::new();
        }

        let take = self.entries.len().min(self.config.max_match_players);
        let cohort: Vec<QueueEntry> = self.entries.drain(..take).collect();

        let mut selected = Vec::with_capacity(cohort.len());
        for entry in cohort {
            self.members.remove(&entry.session_id);
            match sessions.update_state(&entry.session_id, LifecycleState::Active) {
                Ok(()) => selected.push(entry.session_id),
                Err(e) => {
                    tracing::warn!(
                        session_id = %entry.session_id,
                        error = %e,
                        "dropping session from cohort"
                    );
                }
            }
        }

        self.total_matched += selected.len() as u64;
        tracing::info!(
            selected = selected.len(),
            remaining = self.entries.len(),
            "cohort selected for match"
        );
        selected
    }

    /// Puts match finishers back at the end of the queue.
    ///
    /// Each finisher is checked for relegation first; eligible sessions are
    /// relegated instead of requeued and reported with their record.
    pub fn requeue_after_match(
        &mut self,
        sessions: &mut SessionStore,
        finishers: &[SessionId],
    ) -> RequeueOutcome {
        let mut outcome = RequeueOutcome::default();

        for session_id in finishers {
            let Some(session) = sessions.get(session_id) else {
                outcome.failed.push(RequeueFailure {
                    session_id: session_id.clone(),
                    reason: RequeueFailureReason::Disconnected,
                });
                continue;
            };

            if !session.is_connected() {
                reset_to_new(sessions, session_id);
                outcome.failed.push(RequeueFailure {
                    session_id: session_id.clone(),
                    reason: RequeueFailureReason::Disconnected,
                });
                continue;
            }

            if sessions.is_relegation_eligible(session_id) {
                if let Some(record) = sessions.relegate(session_id) {
                    outcome.failed.push(RequeueFailure {
                        session_id: session_id.clone(),
                        reason: RequeueFailureReason::Relegated(record),
                    });
                }
                continue;
            }

            let handle = session.handle.clone().unwrap_or_default();
            if session.state == LifecycleState::Active {
                reset_to_new(sessions, session_id);
            }
            match self.enqueue(sessions, session_id, &handle) {
                Ok(_) => outcome.requeued.push(session_id.clone()),
                Err(rejection) => outcome.failed.push(RequeueFailure {
                    session_id: session_id.clone(),
                    reason: RequeueFailureReason::Rejected(rejection),
                }),
            }
        }

        tracing::info!(
            requeued = outcome.requeued.len(),
            failed = outcome.failed.len(),
            "match finishers requeued"
        );
        outcome
    }

    /// Drops entries whose session is missing, disconnected, or relegated.
    /// Returns how many were removed.
    pub fn cleanup(&mut self, sessions: &mut SessionStore) -> usize {
        let invalid: Vec<SessionId> = self
            .entries
            .iter()
            .filter(|e| {
                sessions
                    .get(&e.session_id)
                    .is_none_or(|s| !s.is_connected() || s.is_relegated())
            })
            .map(|e| e.session_id.clone())
            .collect();

        for session_id in &invalid {
            self.members.remove(session_id);
            reset_to_new(sessions, session_id);
        }
        self.entries
            .retain(|e| self.members.contains(&e.session_id));

        if !invalid.is_empty() {
            tracing::info!(removed = invalid.len(), "queue cleaned");
        }
        invalid.len()
    }

    /// 1-based position, or `None` if not queued.
    pub fn position(&self, session_id: &SessionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.session_id == *session_id)
            .map(|i| i + 1)
    }

    /// Rough time until the session gets into a match: one full
    /// match-plus-intermission cycle per cohort ahead of (and including)
    /// its own.
    pub fn estimated_wait(&self, session_id: &SessionId) -> Option<Duration> {
        let position = self.position(session_id)?;
        let per_match = self.config.max_match_players.max(1);
        let cycles = position.div_ceil(per_match) as u32;
        Some(self.config.cycle_duration * cycles)
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            size: self.entries.len(),
            capacity: self.config.max_size,
            entries: self
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| QueueEntryView {
                    position: i + 1,
                    session_id: e.session_id.clone(),
                    handle: e.handle.clone(),
                    wait_ms: e.enqueued_at.elapsed().as_millis() as u64,
                })
                .collect(),
        }
    }

    pub fn stats(&self) -> QueueStats {
        let size = self.entries.len();
        let capacity = self.config.max_size;
        QueueStats {
            size,
            capacity,
            utilization: if capacity == 0 {
                0.0
            } else {
                size as f64 / capacity as f64
            },
            total_enqueued: self.total_enqueued,
            total_matched: self.total_matched,
            longest_wait_ms: self
                .entries
                .front()
                .map(|e| e.enqueued_at.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.members.contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the queue and its counters for a new epoch.
    pub fn reset_all(&mut self) {
        self.entries.clear();
        self.members.clear();
        self.total_enqueued = 0;
        self.total_matched = 0;
        tracing::info!("matchmaking queue reset");
    }
}

/// Moves a Queued or Active session back to New. Relegated and missing
/// sessions are left alone.
fn reset_to_new(sessions: &mut SessionStore, session_id: &SessionId) {
    let in_cycle = sessions
        .get(session_id)
        .is_some_and(|s| s.state.is_in_cycle());
    if in_cycle {
        let _ = sessions.update_state(session_id, LifecycleState::New);
    }
}
