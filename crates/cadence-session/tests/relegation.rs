//! Integration tests for relegation pressure across the session layer.
//!
//! These drive the public API the way the coordinator does: create
//! sessions, claim handles in the registry, feed match results, and ask
//! the store who should be relegated.

use cadence_protocol::{ConnectionId, MatchId, SessionId};
use cadence_session::{
    HandleRegistry, LifecycleState, RelegationPolicy, SessionConfig, SessionStore,
};

// =========================================================================
// Helpers
// =========================================================================

struct Table {
    store: SessionStore,
    handles: HandleRegistry,
    players: Vec<SessionId>,
}

/// `n` connected sessions, each holding the handle `player_{i}`.
fn table(n: u64) -> Table {
    let mut store = SessionStore::new(SessionConfig::default());
    let mut handles = HandleRegistry::new();
    let mut players = Vec::new();
    for i in 1..=n {
        let id = store.create(ConnectionId(i));
        let handle = format!("player_{i}");
        handles.claim(&id, &handle).unwrap();
        store.set_handle(&id, &handle).unwrap();
        players.push(id);
    }
    Table {
        store,
        handles,
        players,
    }
}

/// Records one match where `players[i]` finished at rank `ranks[i]`.
fn play(table: &mut Table, seq: u64, ranks: &[u32]) {
    let total = ranks.len();
    for (player, rank) in table.players.iter().zip(ranks) {
        table
            .store
            .record_performance(player, MatchId { epoch: 1, seq }, *rank, 0, total);
    }
}

// =========================================================================
// Streak behavior
// =========================================================================

#[test]
fn test_four_player_match_only_last_place_accrues_streak() {
    let mut t = table(4);

    play(&mut t, 1, &[4, 3, 2, 1]);

    let streaks: Vec<u32> = t
        .players
        .iter()
        .map(|p| t.store.get(p).unwrap().relegation_streak)
        .collect();
    assert_eq!(streaks, vec![1, 0, 0, 0]);
}

#[test]
fn test_streak_resets_then_counts_again_from_one() {
    let mut t = table(4);
    play(&mut t, 1, &[4, 3, 2, 1]);
    play(&mut t, 2, &[4, 3, 2, 1]);
    play(&mut t, 3, &[1, 4, 3, 2]);
    assert_eq!(t.store.get(&t.players[0]).unwrap().relegation_streak, 0);

    play(&mut t, 4, &[4, 3, 2, 1]);

    assert_eq!(t.store.get(&t.players[0]).unwrap().relegation_streak, 1);
}

#[test]
fn test_eight_player_match_bottom_three_are_poor() {
    let mut t = table(8);

    play(&mut t, 1, &[1, 2, 3, 4, 5, 6, 7, 8]);

    let poor: Vec<bool> = t
        .players
        .iter()
        .map(|p| t.store.get(p).unwrap().relegation_streak == 1)
        .collect();
    assert_eq!(poor, vec![false, false, false, false, false, true, true, true]);
}

// =========================================================================
// Eligibility floor
// =========================================================================

#[test]
fn test_three_consecutive_last_places_make_session_eligible() {
    let mut t = table(4);
    for seq in 1..=3 {
        play(&mut t, seq, &[4, 3, 2, 1]);
    }

    assert!(t.store.is_relegation_eligible(&t.players[0]));
    for other in &t.players[1..] {
        assert!(!t.store.is_relegation_eligible(other));
    }

    let record = t.store.relegate(&t.players[0]).unwrap();
    assert_eq!(record.handle.as_deref(), Some("player_1"));
    assert_eq!(
        t.store.get(&t.players[0]).unwrap().state,
        LifecycleState::Relegated
    );
}

#[test]
fn test_no_relegation_below_player_floor_regardless_of_streak() {
    let mut t = table(3);
    for seq in 1..=20 {
        play(&mut t, seq, &[3, 2, 1]);
    }

    assert_eq!(t.store.get(&t.players[0]).unwrap().relegation_streak, 20);
    assert!(!t.store.is_relegation_eligible(&t.players[0]));
}

#[test]
fn test_custom_policy_threshold_is_respected() {
    let mut store = SessionStore::new(SessionConfig {
        relegation: RelegationPolicy {
            threshold: 1,
            min_players: 2,
            ..RelegationPolicy::default()
        },
        ..SessionConfig::default()
    });
    let a = store.create(ConnectionId(1));
    let _b = store.create(ConnectionId(2));

    store.record_performance(&a, MatchId { epoch: 1, seq: 1 }, 2, 0, 2);

    assert!(store.is_relegation_eligible(&a));
}

// =========================================================================
// Registry and store stay independent
// =========================================================================

#[test]
fn test_handles_survive_session_purge_until_reset() {
    let mut t = table(2);
    let purged_id = t.players[1].clone();
    t.store.mark_disconnected(ConnectionId(2));
    t.handles.mark_inactive(&purged_id);

    let purged = t.store.cleanup_stale(std::time::Duration::ZERO);

    assert_eq!(purged, vec![purged_id.clone()]);
    let record = t.handles.lookup("player_2").unwrap();
    assert_eq!(record.session_id, purged_id);
    assert!(!record.is_active);

    t.handles.reset_all();
    t.store.reset_all();
    assert!(t.handles.lookup("player_2").is_none());
    assert!(t.store.is_empty());
}
