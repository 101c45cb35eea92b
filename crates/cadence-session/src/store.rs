//! The session store: tracks every player session in the current epoch.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating sessions when connections arrive
//! - Tracking which sessions are connected/disconnected
//! - Recording match performance and maintaining relegation streaks
//! - Purging sessions that stayed disconnected for too long
//!
//! # Concurrency note
//!
//! `SessionStore` is NOT thread-safe by itself: it uses plain `HashMap`s.
//! It is owned by the coordinator actor and only ever mutated from that
//! single task, which is what serializes all session updates.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use cadence_protocol::{unix_millis, ConnectionId, MatchId, SessionId};
use rand::Rng;

use crate::{
    LifecycleState, PerformanceEntry, RelegationRecord, Session, SessionConfig, SessionError,
    SessionStats,
};

/// Owns all session records for the current epoch.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ [connected] ──mark_disconnected()──→ [disconnected]
///                   ↑                                     │
///                   └───────────reconnect()───────────────┤
///                                                         ▼ (idle too long)
///                                                  cleanup_stale()
/// ```
///
/// `reset_all()` destroys everything at the end of an epoch.
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,

    /// Index from live connection to session, kept in sync with each
    /// session's `connection_id`.
    connections: HashMap<ConnectionId, SessionId>,

    /// Per-epoch id counter; restarts on `reset_all`.
    next_seq: u64,

    config: SessionConfig,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            connections: HashMap::new(),
            next_seq: 0,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a session for a fresh connection. Always succeeds.
    ///
    /// If `connection_id` was still linked to another session (the gateway
    /// reused an id without reporting the disconnect), that session is
    /// detached first.
    pub fn create(&mut self, connection_id: ConnectionId) -> SessionId {
        if let Some(previous) = self.connections.remove(&connection_id) {
            if let Some(session) = self.sessions.get_mut(&previous) {
                session.unlink();
            }
            tracing::warn!(
                %connection_id,
                session_id = %previous,
                "connection id reused, previous session detached"
            );
        }

        self.next_seq += 1;
        let session_id = generate_session_id(self.next_seq);
        self.sessions.insert(
            session_id.clone(),
            Session::new(session_id.clone(), connection_id),
        );
        self.connections.insert(connection_id, session_id.clone());

        tracing::info!(%session_id, %connection_id, "session created");
        session_id
    }

    /// Removes a session and its connection mapping.
    pub fn destroy(&mut self, session_id: &SessionId) -> bool {
        match self.sessions.remove(session_id) {
            Some(session) => {
                if let Some(conn) = session.connection_id {
                    self.connections.remove(&conn);
                }
                tracing::debug!(%session_id, "session destroyed");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn session_for_connection(&self, connection_id: ConnectionId) -> Option<&SessionId> {
        self.connections.get(&connection_id)
    }

    /// Sets the session's handle. Handles are immutable once set.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] or [`SessionError::HandleAlreadySet`].
    pub fn set_handle(
        &mut self,
        session_id: &SessionId,
        handle: &str,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;
        if session.handle.is_some() {
            return Err(SessionError::HandleAlreadySet(session_id.clone()));
        }
        session.handle = Some(handle.to_string());
        session.touch();
        Ok(())
    }

    /// Moves a session to `state`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: unknown session
    /// - [`SessionError::Relegated`]: relegated sessions never leave
    ///   Relegated within an epoch
    pub fn update_state(
        &mut self,
        session_id: &SessionId,
        state: LifecycleState,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;
        if session.is_relegated() && state != LifecycleState::Relegated {
            return Err(SessionError::Relegated(session_id.clone()));
        }
        if session.state != state {
            tracing::debug!(%session_id, from = %session.state, to = %state, "session state changed");
        }
        session.state = state;
        session.touch();
        Ok(())
    }

    /// Unlinks a connection from its session.
    ///
    /// Returns the session that lost its connection, or `None` if the
    /// connection was unknown.
    pub fn mark_disconnected(&mut self, connection_id: ConnectionId) -> Option<SessionId> {
        let session_id = self.connections.remove(&connection_id)?;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.unlink();
        }
        tracing::info!(%session_id, %connection_id, "session disconnected");
        Some(session_id)
    }

    /// Links a disconnected session to a new connection.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: the session was purged or never existed
    /// - [`SessionError::AlreadyConnected`]: the session still has a live link
    pub fn reconnect(
        &mut self,
        session_id: &SessionId,
        connection_id: ConnectionId,
    ) -> Result<(), SessionError> {
        match self.sessions.get(session_id) {
            None => return Err(SessionError::NotFound(session_id.clone())),
            Some(session) if session.is_connected() => {
                return Err(SessionError::AlreadyConnected(session_id.clone()));
            }
            Some(_) => {}
        }

        // The new connection id might still point at some other session.
        if let Some(previous) = self.connections.remove(&connection_id) {
            if let Some(other) = self.sessions.get_mut(&previous) {
                other.unlink();
            }
        }

        if let Some(session) = self.sessions.get_mut(session_id) {
            session.link(connection_id);
        }
        self.connections.insert(connection_id, session_id.clone());
        tracing::info!(%session_id, %connection_id, "session reconnected");
        Ok(())
    }

    /// Appends a match outcome and updates the relegation streak.
    ///
    /// Returns `false` if the session doesn't exist.
    pub fn record_performance(
        &mut self,
        session_id: &SessionId,
        match_id: MatchId,
        rank: u32,
        score: i64,
        total_players: usize,
    ) -> bool {
        let poor = self.config.relegation.is_poor(rank, total_players);
        let history_len = self.config.performance_history_len;

        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };

        session.performance_history.push_back(PerformanceEntry {
            match_id,
            rank,
            score,
            total_players,
            poor,
            recorded_at: unix_millis(),
        });
        while session.performance_history.len() > history_len {
            session.performance_history.pop_front();
        }

        session.total_matches_played += 1;
        session.relegation_streak = if poor {
            session.relegation_streak + 1
        } else {
            0
        };
        session.touch();

        tracing::debug!(
            %session_id,
            %match_id,
            rank,
            total_players,
            poor,
            streak = session.relegation_streak,
            "performance recorded"
        );
        true
    }

    /// Connected sessions that are not relegated: the pool relegation
    /// pressure is measured against.
    pub fn eligible_pool_size(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.is_connected() && !s.is_relegated())
            .count()
    }

    /// Whether the session has earned relegation.
    ///
    /// All of the following must hold:
    /// - at least `threshold` matches played
    /// - at least `min_players` connected, non-relegated sessions exist
    /// - a poor-result streak of at least `threshold`
    /// - not already relegated
    pub fn is_relegation_eligible(&self, session_id: &SessionId) -> bool {
        let policy = &self.config.relegation;
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };
        !session.is_relegated()
            && session.total_matches_played >= policy.threshold
            && session.relegation_streak >= policy.threshold
            && self.eligible_pool_size() >= policy.min_players
    }

    /// Relegates a session and returns a snapshot for notifications.
    ///
    /// Returns `None` if the session is missing or already relegated, so a
    /// repeated call never produces a second notification.
    pub fn relegate(&mut self, session_id: &SessionId) -> Option<RelegationRecord> {
        let session = self.sessions.get_mut(session_id)?;
        if session.is_relegated() {
            return None;
        }
        session.state = LifecycleState::Relegated;
        session.touch();

        let record = RelegationRecord {
            session_id: session_id.clone(),
            handle: session.handle.clone(),
            relegation_streak: session.relegation_streak,
            total_matches_played: session.total_matches_played,
            relegated_at: unix_millis(),
        };
        tracing::info!(
            %session_id,
            handle = ?record.handle,
            streak = record.relegation_streak,
            "session relegated"
        );
        Some(record)
    }

    /// Ids of all sessions in `state`, oldest first.
    pub fn sessions_in_state(&self, state: LifecycleState) -> Vec<SessionId> {
        let mut matching: Vec<&Session> =
            self.sessions.values().filter(|s| s.state == state).collect();
        matching.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        matching.into_iter().map(|s| s.session_id.clone()).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            total: self.sessions.len(),
            ..SessionStats::default()
        };
        for session in self.sessions.values() {
            if session.is_connected() {
                stats.connected += 1;
            } else {
                stats.disconnected += 1;
            }
            match session.state {
                LifecycleState::New => stats.new += 1,
                LifecycleState::Queued => stats.queued += 1,
                LifecycleState::Active => stats.active += 1,
                LifecycleState::Relegated => stats.relegated += 1,
            }
        }
        stats
    }

    /// Destroys sessions that have been disconnected for at least
    /// `max_idle`, counted from the disconnect. Returns the purged ids.
    pub fn cleanup_stale(&mut self, max_idle: Duration) -> Vec<SessionId> {
        let stale: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.disconnected_at.is_some_and(|at| at.elapsed() >= max_idle))
            .map(|s| s.session_id.clone())
            .collect();

        for session_id in &stale {
            self.sessions.remove(session_id);
            tracing::info!(%session_id, "stale session purged");
        }
        stale
    }

    /// Wipes every session and restarts the id counter.
    pub fn reset_all(&mut self) {
        let wiped = self.sessions.len();
        self.sessions.clear();
        self.connections.clear();
        self.next_seq = 0;
        tracing::info!(wiped, "session store reset");
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Recent outcomes for a session, oldest first.
    pub fn performance_history(&self, session_id: &SessionId) -> Option<&VecDeque<PerformanceEntry>> {
        self.sessions.get(session_id).map(|s| &s.performance_history)
    }
}

/// `s{seq}-{8 hex}`: the counter keeps ids short and readable in logs;
/// the random suffix keeps an id from a previous epoch from aliasing a
/// new session after the counter restarts.
fn generate_session_id(seq: u64) -> SessionId {
    let suffix: u32 = rand::rng().random();
    SessionId::new(format!("s{seq}-{suffix:08x}"))
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionStore`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(SessionConfig::default())
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId(id)
    }

    fn mid(seq: u64) -> MatchId {
        MatchId { epoch: 1, seq }
    }

    /// Creates `n` connected sessions on connections 1..=n.
    fn populated(n: u64) -> (SessionStore, Vec<SessionId>) {
        let mut store = store();
        let ids = (1..=n).map(|i| store.create(conn(i))).collect();
        (store, ids)
    }

    // =====================================================================
    // create() / destroy()
    // =====================================================================

    #[test]
    fn test_create_returns_new_connected_session() {
        let mut store = store();

        let id = store.create(conn(1));

        let session = store.get(&id).unwrap();
        assert_eq!(session.state, LifecycleState::New);
        assert!(session.is_connected());
        assert_eq!(session.handle, None);
        assert_eq!(store.session_for_connection(conn(1)), Some(&id));
    }

    #[test]
    fn test_create_generates_unique_ids() {
        let (store, ids) = populated(50);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 50);
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_create_with_reused_connection_detaches_previous() {
        let mut store = store();
        let first = store.create(conn(1));

        let second = store.create(conn(1));

        assert!(!store.get(&first).unwrap().is_connected());
        assert_eq!(store.session_for_connection(conn(1)), Some(&second));
    }

    #[test]
    fn test_destroy_removes_session_and_connection() {
        let mut store = store();
        let id = store.create(conn(1));

        assert!(store.destroy(&id));
        assert!(!store.destroy(&id));
        assert!(store.get(&id).is_none());
        assert_eq!(store.connected_count(), 0);
    }

    // =====================================================================
    // set_handle() / update_state()
    // =====================================================================

    #[test]
    fn test_set_handle_is_immutable() {
        let mut store = store();
        let id = store.create(conn(1));

        store.set_handle(&id, "alice").unwrap();
        let again = store.set_handle(&id, "bob");

        assert!(matches!(again, Err(SessionError::HandleAlreadySet(_))));
        assert_eq!(store.get(&id).unwrap().handle.as_deref(), Some("alice"));
    }

    #[test]
    fn test_update_state_relegated_cannot_return() {
        let mut store = store();
        let id = store.create(conn(1));
        store.relegate(&id).unwrap();

        for target in [LifecycleState::Queued, LifecycleState::Active, LifecycleState::New] {
            assert!(matches!(
                store.update_state(&id, target),
                Err(SessionError::Relegated(_))
            ));
        }
        assert_eq!(store.get(&id).unwrap().state, LifecycleState::Relegated);
    }

    #[test]
    fn test_update_state_unknown_session_not_found() {
        let mut store = store();
        let result = store.update_state(&SessionId::new("nope"), LifecycleState::Queued);
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    // =====================================================================
    // mark_disconnected() / reconnect()
    // =====================================================================

    #[test]
    fn test_mark_disconnected_returns_owner() {
        let mut store = store();
        let id = store.create(conn(7));

        assert_eq!(store.mark_disconnected(conn(7)), Some(id.clone()));
        assert!(!store.get(&id).unwrap().is_connected());
        assert_eq!(store.mark_disconnected(conn(7)), None);
    }

    #[test]
    fn test_reconnect_links_new_connection() {
        let mut store = store();
        let id = store.create(conn(1));
        store.mark_disconnected(conn(1));

        store.reconnect(&id, conn(2)).unwrap();

        assert_eq!(store.get(&id).unwrap().connection_id, Some(conn(2)));
        assert_eq!(store.session_for_connection(conn(2)), Some(&id));
    }

    #[test]
    fn test_reconnect_while_connected_is_rejected() {
        let mut store = store();
        let id = store.create(conn(1));

        let result = store.reconnect(&id, conn(2));

        assert!(matches!(result, Err(SessionError::AlreadyConnected(_))));
    }

    #[test]
    fn test_reconnect_unknown_session_is_rejected() {
        let mut store = store();
        let result = store.reconnect(&SessionId::new("s1-00000000"), conn(2));
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    // =====================================================================
    // record_performance()
    // =====================================================================

    #[test]
    fn test_record_performance_poor_increments_streak() {
        let (mut store, ids) = populated(4);

        assert!(store.record_performance(&ids[0], mid(1), 4, 10, 4));
        assert!(store.record_performance(&ids[0], mid(2), 4, 12, 4));

        let s = store.get(&ids[0]).unwrap();
        assert_eq!(s.relegation_streak, 2);
        assert_eq!(s.total_matches_played, 2);
        assert!(s.performance_history.iter().all(|e| e.poor));
    }

    #[test]
    fn test_record_performance_good_result_resets_streak() {
        let (mut store, ids) = populated(4);
        store.record_performance(&ids[0], mid(1), 4, 0, 4);
        store.record_performance(&ids[0], mid(2), 4, 0, 4);

        store.record_performance(&ids[0], mid(3), 3, 50, 4);

        assert_eq!(store.get(&ids[0]).unwrap().relegation_streak, 0);
    }

    #[test]
    fn test_record_performance_history_is_capped() {
        let (mut store, ids) = populated(1);
        for seq in 1..=15 {
            store.record_performance(&ids[0], mid(seq), 1, seq as i64, 4);
        }

        let history = store.performance_history(&ids[0]).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history.front().unwrap().match_id, mid(6));
        assert_eq!(history.back().unwrap().match_id, mid(15));
        assert_eq!(store.get(&ids[0]).unwrap().total_matches_played, 15);
    }

    #[test]
    fn test_record_performance_unknown_session_returns_false() {
        let mut store = store();
        assert!(!store.record_performance(&SessionId::new("ghost"), mid(1), 1, 0, 4));
    }

    // =====================================================================
    // is_relegation_eligible() / relegate()
    // =====================================================================

    #[test]
    fn test_is_relegation_eligible_after_three_poor_results() {
        let (mut store, ids) = populated(4);
        for seq in 1..=2 {
            store.record_performance(&ids[0], mid(seq), 4, 0, 4);
        }
        assert!(!store.is_relegation_eligible(&ids[0]));

        store.record_performance(&ids[0], mid(3), 4, 0, 4);

        assert!(store.is_relegation_eligible(&ids[0]));
    }

    #[test]
    fn test_is_relegation_eligible_requires_four_connected() {
        let (mut store, ids) = populated(4);
        for seq in 1..=5 {
            store.record_performance(&ids[0], mid(seq), 4, 0, 4);
        }
        store.mark_disconnected(conn(4));

        assert_eq!(store.eligible_pool_size(), 3);
        assert!(!store.is_relegation_eligible(&ids[0]));
    }

    #[test]
    fn test_is_relegation_eligible_relegated_sessions_shrink_pool() {
        let (mut store, ids) = populated(4);
        for seq in 1..=3 {
            store.record_performance(&ids[0], mid(seq), 4, 0, 4);
        }
        store.relegate(&ids[3]).unwrap();

        assert!(!store.is_relegation_eligible(&ids[0]));
    }

    #[test]
    fn test_relegate_returns_snapshot_once() {
        let (mut store, ids) = populated(4);
        store.set_handle(&ids[0], "slowpoke").unwrap();
        for seq in 1..=3 {
            store.record_performance(&ids[0], mid(seq), 4, 0, 4);
        }

        let record = store.relegate(&ids[0]).unwrap();

        assert_eq!(record.handle.as_deref(), Some("slowpoke"));
        assert_eq!(record.relegation_streak, 3);
        assert_eq!(record.total_matches_played, 3);
        assert!(store.relegate(&ids[0]).is_none());
        assert!(store.relegate(&SessionId::new("ghost")).is_none());
    }

    // =====================================================================
    // Bulk queries
    // =====================================================================

    #[test]
    fn test_stats_counts_by_state() {
        let (mut store, ids) = populated(4);
        store.update_state(&ids[0], LifecycleState::Queued).unwrap();
        store.update_state(&ids[1], LifecycleState::Active).unwrap();
        store.relegate(&ids[2]);
        store.mark_disconnected(conn(4));

        let stats = store.stats();

        assert_eq!(
            stats,
            SessionStats {
                total: 4,
                connected: 3,
                disconnected: 1,
                new: 1,
                queued: 1,
                active: 1,
                relegated: 1,
            }
        );
    }

    #[test]
    fn test_sessions_in_state_filters() {
        let (mut store, ids) = populated(3);
        store.update_state(&ids[2], LifecycleState::Queued).unwrap();

        assert_eq!(store.sessions_in_state(LifecycleState::Queued), vec![ids[2].clone()]);
        assert_eq!(store.sessions_in_state(LifecycleState::New).len(), 2);
    }

    #[test]
    fn test_cleanup_stale_purges_only_disconnected() {
        let (mut store, ids) = populated(3);
        store.mark_disconnected(conn(2));

        let purged = store.cleanup_stale(Duration::ZERO);

        assert_eq!(purged, vec![ids[1].clone()]);
        assert_eq!(store.len(), 2);
        assert!(store.get(&ids[0]).is_some());
    }

    #[test]
    fn test_cleanup_stale_keeps_recently_disconnected() {
        let (mut store, _ids) = populated(2);
        store.mark_disconnected(conn(1));

        let purged = store.cleanup_stale(Duration::from_secs(3600));

        assert!(purged.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stale_counts_from_disconnect_not_last_activity() {
        let (mut store, ids) = populated(2);
        store.mark_disconnected(conn(2));
        tokio::time::advance(Duration::from_secs(10)).await;

        // A late result for its last match touches the record.
        assert!(store.record_performance(&ids[1], mid(1), 1, 100, 2));
        let purged = store.cleanup_stale(Duration::from_secs(5));

        assert_eq!(purged, vec![ids[1].clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stale_reconnect_clears_disconnect_time() {
        let (mut store, ids) = populated(1);
        store.mark_disconnected(conn(1));
        tokio::time::advance(Duration::from_secs(10)).await;
        store.reconnect(&ids[0], conn(7)).unwrap();

        assert!(store.get(&ids[0]).unwrap().disconnected_at.is_none());
        assert!(store.cleanup_stale(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_reset_all_wipes_and_restarts_counter() {
        let (mut store, _ids) = populated(3);

        store.reset_all();

        assert!(store.is_empty());
        assert_eq!(store.connected_count(), 0);
        let id = store.create(conn(1));
        assert!(id.as_str().starts_with("s1-"));
    }
}
