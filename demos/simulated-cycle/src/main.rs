//! Runs a compressed match cycle with simulated players and prints the
//! encoded notification feed a gateway would broadcast.
//!
//! Run with: `cargo run --package simulated-cycle`
//! (`RUST_LOG=cadence_cycle=debug` shows every transition).

use std::time::Duration;

use cadence::prelude::*;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;

const BOTS: u64 = 6;
const RUN_FOR: Duration = Duration::from_secs(45);

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

/// Connects `BOTS` players for `epoch`, claims their handles, and queues
/// them. Connection ids are unique across epochs.
async fn join_bots(cycle: &CoordinatorHandle, epoch: u64) -> Result<Vec<SessionId>, CadenceError> {
    let mut sessions = Vec::new();
    for bot in 1..=BOTS {
        let session = cycle.connect(ConnectionId(epoch * 100 + bot)).await?;
        cycle.claim_handle(session.clone(), format!("bot_{bot}")).await?;
        cycle.join_queue(session.clone()).await?;
        sessions.push(session);
    }
    tracing::info!(epoch, bots = sessions.len(), "bots queued");
    Ok(sessions)
}

/// Ranks the participants in random order, as if the match had been
/// played.
fn simulate_results(match_record: &MatchRecord) -> Vec<ParticipantResult> {
    let mut order = match_record.participants.clone();
    order.shuffle(&mut rand::rng());
    order
        .into_iter()
        .enumerate()
        .map(|(i, session_id)| ParticipantResult {
            session_id,
            rank: i as u32 + 1,
            score: 1000 - 100 * i as i64,
        })
        .collect()
}

/// Reacts to the cycle the way game servers and returning players would:
/// reports results partway through each match and requeues the bots after
/// every reset.
async fn referee(cycle: CoordinatorHandle, mut events: mpsc::UnboundedReceiver<Notification>, report_after: Duration) {
    let mut epoch = 1;
    while let Some(notification) = events.recv().await {
        match notification {
            Notification::MatchStarted { match_record, .. } => {
                let cycle = cycle.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(report_after).await;
                    let results = simulate_results(&match_record);
                    if let Err(e) = cycle.record_match_results(results).await {
                        tracing::warn!(match_id = %match_record.match_id, error = %e, "results not recorded");
                    }
                });
            }
            Notification::ServerReset { .. } => epoch += 1,
            Notification::PhaseChanged {
                new_phase: Phase::Intermission,
                ..
            } if epoch > 1 => {
                let snapshot = match cycle.snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(_) => break,
                };
                if snapshot.sessions.total == 0 {
                    if let Err(e) = join_bots(&cycle, epoch).await {
                        tracing::warn!(error = %e, "bots could not rejoin");
                    }
                }
            }
            _ => {}
        }
    }
}

fn demo_config() -> CycleConfig {
    CycleConfig {
        match_duration: Duration::from_secs(3),
        intermission_duration: Duration::from_secs(1),
        reset_interval: Duration::from_secs(30),
        reset_pause: Duration::from_secs(1),
        ..CycleConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    cadence::telemetry::init_tracing("info")?;

    let server = CadenceServer::builder()
        .config(demo_config())
        .maintenance_interval(Duration::from_secs(5))
        .build();
    let cycle = server.coordinator().clone();
    let mut feed = server.notification_feed().await?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    cycle
        .subscribe(
            &[
                NotificationKind::MatchStarted,
                NotificationKind::ServerReset,
                NotificationKind::PhaseChanged,
            ],
            move |n| {
                events_tx.send(n.clone()).map_err(|_| "referee stopped")?;
                Ok(())
            },
        )
        .await?;
    tokio::spawn(referee(cycle.clone(), events_rx, Duration::from_secs(1)));

    join_bots(&cycle, 1).await?;

    let deadline = tokio::time::sleep(RUN_FOR);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            frame = feed.recv() => match frame {
                Some(frame) => println!("{}", String::from_utf8_lossy(&frame)),
                None => break,
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let snapshot = cycle.snapshot().await?;
    eprintln!(
        "epoch {} finished {} matches, {} relegated",
        snapshot.epoch, snapshot.total_matches, snapshot.sessions.relegated
    );
    server.shutdown()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_results_ranks_every_participant_once() {
        let participants: Vec<SessionId> =
            (1..=5).map(|i| SessionId::new(format!("s{i}"))).collect();
        let record = MatchRecord::new(MatchId { epoch: 1, seq: 1 }, 0, participants.clone());

        let results = simulate_results(&record);

        let mut ranks: Vec<u32> = results.iter().map(|r| r.rank).collect();
        ranks.sort();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        for id in &participants {
            assert!(results.iter().any(|r| &r.session_id == id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bots_fill_a_match_and_results_are_recorded() {
        let server = CadenceServer::builder()
            .config(demo_config())
            .without_maintenance()
            .build();
        let cycle = server.coordinator().clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        cycle
            .subscribe(&NotificationKind::ALL, move |n| {
                events_tx.send(n.clone()).map_err(|_| "referee stopped")?;
                Ok(())
            })
            .await
            .unwrap();
        tokio::spawn(referee(cycle.clone(), events_rx, Duration::from_secs(1)));

        join_bots(&cycle, 1).await.unwrap();
        // Intermission ends at 1s, results at 2s, match ends at 4s.
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        let history = cycle.match_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].participants.len(), BOTS as usize);
        assert_eq!(history[0].results.as_ref().unwrap().len(), BOTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bots_rejoin_after_reset() {
        let server = CadenceServer::builder()
            .config(demo_config())
            .without_maintenance()
            .build();
        let cycle = server.coordinator().clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        cycle
            .subscribe(&NotificationKind::ALL, move |n| {
                events_tx.send(n.clone()).map_err(|_| "referee stopped")?;
                Ok(())
            })
            .await
            .unwrap();
        tokio::spawn(referee(cycle.clone(), events_rx, Duration::from_secs(1)));
        join_bots(&cycle, 1).await.unwrap();

        cycle.force_reset().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = cycle.snapshot().await.unwrap();
        assert_eq!(snapshot.epoch, 2);
        assert_eq!(snapshot.sessions.total, BOTS as usize);
    }
}
