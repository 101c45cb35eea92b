//! Integration tests for queue fairness and the post-match requeue.

use cadence_protocol::{ConnectionId, MatchId, SessionId};
use cadence_queue::{
    MatchmakingQueue, QueueConfig, QueueRejection, RequeueFailureReason,
};
use cadence_session::{LifecycleState, SessionConfig, SessionStore};

// =========================================================================
// Helpers
// =========================================================================

fn handle(i: usize) -> String {
    format!("bot_{i}")
}

/// `n` connected sessions with handles, none queued yet.
fn lobby(n: usize) -> (SessionStore, Vec<SessionId>) {
    let mut store = SessionStore::new(SessionConfig::default());
    let ids = (0..n)
        .map(|i| {
            let id = store.create(ConnectionId(i as u64 + 1));
            store.set_handle(&id, &handle(i)).unwrap();
            id
        })
        .collect();
    (store, ids)
}

fn enqueue_all(queue: &mut MatchmakingQueue, store: &mut SessionStore, ids: &[SessionId]) {
    for (i, id) in ids.iter().enumerate() {
        queue.enqueue(store, id, &handle(i)).unwrap();
    }
}

// =========================================================================
// FIFO selection
// =========================================================================

#[test]
fn test_select_for_match_takes_first_sixteen_in_join_order() {
    let (mut store, ids) = lobby(20);
    let mut queue = MatchmakingQueue::new(QueueConfig::default());
    enqueue_all(&mut queue, &mut store, &ids);

    let cohort = queue.select_for_match(&mut store);

    assert_eq!(cohort, ids[..16].to_vec());
    for id in &cohort {
        assert_eq!(store.get(id).unwrap().state, LifecycleState::Active);
    }
    assert_eq!(queue.len(), 4);
    assert_eq!(queue.position(&ids[16]), Some(1));
    assert_eq!(queue.position(&ids[19]), Some(4));
}

#[test]
fn test_selected_players_cannot_rejoin_while_in_match() {
    let (mut store, ids) = lobby(2);
    let mut queue = MatchmakingQueue::new(QueueConfig::default());
    enqueue_all(&mut queue, &mut store, &ids);
    queue.select_for_match(&mut store);

    let result = queue.enqueue(&mut store, &ids[0], &handle(0));

    assert_eq!(result, Err(QueueRejection::InMatch(ids[0].clone())));
}

#[test]
fn test_no_session_is_queued_twice_across_requeue() {
    let (mut store, ids) = lobby(3);
    let mut queue = MatchmakingQueue::new(QueueConfig::default());
    enqueue_all(&mut queue, &mut store, &ids);
    let cohort = queue.select_for_match(&mut store);

    let outcome = queue.requeue_after_match(&mut store, &cohort);
    let again = queue.requeue_after_match(&mut store, &cohort);

    assert_eq!(outcome.requeued.len(), 3);
    assert!(again.requeued.is_empty());
    assert_eq!(queue.len(), 3);
}

// =========================================================================
// requeue_after_match()
// =========================================================================

#[test]
fn test_requeue_puts_finishers_behind_waiting_players() {
    let (mut store, ids) = lobby(5);
    let mut queue = MatchmakingQueue::new(QueueConfig {
        max_match_players: 3,
        ..QueueConfig::default()
    });
    enqueue_all(&mut queue, &mut store, &ids);
    let cohort = queue.select_for_match(&mut store);

    let outcome = queue.requeue_after_match(&mut store, &cohort);

    assert_eq!(outcome.requeued, cohort);
    let order: Vec<SessionId> = queue
        .status()
        .entries
        .into_iter()
        .map(|e| e.session_id)
        .collect();
    assert_eq!(
        order,
        vec![
            ids[3].clone(),
            ids[4].clone(),
            ids[0].clone(),
            ids[1].clone(),
            ids[2].clone()
        ]
    );
}

#[test]
fn test_requeue_reports_disconnected_finishers() {
    let (mut store, ids) = lobby(3);
    let mut queue = MatchmakingQueue::new(QueueConfig::default());
    enqueue_all(&mut queue, &mut store, &ids);
    let cohort = queue.select_for_match(&mut store);
    store.mark_disconnected(ConnectionId(2));

    let outcome = queue.requeue_after_match(&mut store, &cohort);

    assert_eq!(outcome.requeued, vec![ids[0].clone(), ids[2].clone()]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].session_id, ids[1]);
    assert_eq!(outcome.failed[0].reason, RequeueFailureReason::Disconnected);
    assert_eq!(store.get(&ids[1]).unwrap().state, LifecycleState::New);
}

#[test]
fn test_requeue_relegates_eligible_finisher_instead_of_queueing() {
    let (mut store, ids) = lobby(4);
    let mut queue = MatchmakingQueue::new(QueueConfig::default());
    enqueue_all(&mut queue, &mut store, &ids);

    let mut outcome = None;
    for seq in 1..=3 {
        let cohort = queue.select_for_match(&mut store);
        assert_eq!(cohort.len(), 4);
        // ids[0] finishes last every time.
        let mut next_rank = 1;
        for id in &cohort {
            let rank = if *id == ids[0] {
                4
            } else {
                next_rank += 1;
                next_rank - 1
            };
            store.record_performance(id, MatchId { epoch: 1, seq }, rank, 0, 4);
        }
        outcome = Some(queue.requeue_after_match(&mut store, &cohort));
    }
    let outcome = outcome.unwrap();

    let relegated: Vec<&SessionId> = outcome.relegations().map(|r| &r.session_id).collect();
    assert_eq!(relegated, vec![&ids[0]]);
    assert_eq!(store.get(&ids[0]).unwrap().state, LifecycleState::Relegated);
    assert!(!queue.contains(&ids[0]));
    assert_eq!(queue.len(), 3);
}

#[test]
fn test_requeue_into_full_queue_is_reported_as_rejected() {
    let (mut store, ids) = lobby(4);
    let mut queue = MatchmakingQueue::new(QueueConfig {
        max_size: 2,
        max_match_players: 2,
        ..QueueConfig::default()
    });
    enqueue_all(&mut queue, &mut store, &ids[..2]);
    let cohort = queue.select_for_match(&mut store);
    queue.enqueue(&mut store, &ids[2], &handle(2)).unwrap();
    queue.enqueue(&mut store, &ids[3], &handle(3)).unwrap();

    let outcome = queue.requeue_after_match(&mut store, &cohort);

    assert!(outcome.requeued.is_empty());
    assert_eq!(outcome.failed.len(), 2);
    assert_eq!(
        outcome.failed[0].reason,
        RequeueFailureReason::Rejected(QueueRejection::QueueFull(2))
    );
    assert_eq!(store.get(&ids[0]).unwrap().state, LifecycleState::New);
}
