//! The coordinator actor.
//!
//! One Tokio task owns the phase, the session store, the handle registry,
//! the queue, the timers, and the listeners. Everything that can change
//! them arrives as a [`Command`] on a single unbounded mailbox: calls from
//! the gateway and timer firings alike. Commands are processed strictly
//! one at a time, so a disconnect can never interleave with the middle of
//! a match transition.
//!
//! ```text
//!  CoordinatorHandle ──Command──┐
//!                               ├──→ mailbox ──→ Coordinator::run
//!  TimerService ──TimerFired────┘                    │
//!                                                    ├─ SessionStore
//!                                                    ├─ HandleRegistry
//!                                                    ├─ MatchmakingQueue
//!                                                    └─ ListenerRegistry
//! ```

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use cadence_protocol::{
    unix_millis, ConnectionId, MatchId, MatchRecord, Notification, NotificationKind,
    ParticipantResult, Phase, SessionId,
};
use cadence_queue::{MatchmakingQueue, QueueStats, QueueStatus};
use cadence_session::{
    HandleRecord, HandleRegistry, HandleStats, LifecycleState, RelegationRecord, Session,
    SessionStats, SessionStore,
};
use cadence_timer::{TimerId, TimerKind, TimerMetrics, TimerService};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::notify::{Listener, ListenerId, ListenerRegistry};
use crate::{CycleConfig, CycleError};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Messages processed by the coordinator task.
///
/// Variants carrying a `oneshot::Sender` expect a reply; the handle awaits
/// it.
pub(crate) enum Command {
    Connect {
        connection_id: ConnectionId,
        reply: oneshot::Sender<SessionId>,
    },
    Disconnect {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<SessionId, CycleError>>,
    },
    Reconnect {
        session_id: SessionId,
        connection_id: ConnectionId,
        reply: oneshot::Sender<Result<(), CycleError>>,
    },
    ClaimHandle {
        session_id: SessionId,
        handle: String,
        reply: oneshot::Sender<Result<(), CycleError>>,
    },
    JoinQueue {
        session_id: SessionId,
        reply: oneshot::Sender<Result<usize, CycleError>>,
    },
    LeaveQueue {
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    RecordResults {
        results: Vec<ParticipantResult>,
        reply: oneshot::Sender<Result<RecordOutcome, CycleError>>,
    },
    ForceReset {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<CycleSnapshot>,
    },
    Subscribe {
        kinds: Vec<NotificationKind>,
        listener: Listener,
        reply: oneshot::Sender<ListenerId>,
    },
    Unsubscribe {
        listener_id: ListenerId,
        reply: oneshot::Sender<bool>,
    },
    MaintenanceTick {
        reply: oneshot::Sender<MaintenanceReport>,
    },
    Session {
        session_id: SessionId,
        reply: oneshot::Sender<Option<Session>>,
    },
    LookupHandle {
        handle: String,
        reply: oneshot::Sender<Option<HandleRecord>>,
    },
    MatchHistory {
        reply: oneshot::Sender<Vec<MatchRecord>>,
    },
    /// Posted by a timer callback. Never sent by the handle.
    TimerFired {
        kind: TimerKind,
        id: TimerId,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// What `record_match_results` did with the submitted entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub match_id: MatchId,
    /// Entries applied to participants' performance history.
    pub recorded: usize,
    /// Entries for non-participants, duplicates, ranks outside
    /// `1..=participants`, or participants purged since the match started.
    pub ignored: Vec<ParticipantResult>,
}

/// What one maintenance pass cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Disconnected sessions past the idle cutoff, now destroyed.
    pub stale_purged: Vec<SessionId>,
    /// Queue entries dropped because their session became invalid.
    pub queue_cleaned: usize,
    /// Sessions relegated by this pass (only during an intermission).
    pub relegated: Vec<RelegationRecord>,
}

/// A read-only view of the whole cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub epoch: u64,
    pub phase: Phase,
    pub active_match: Option<MatchRecord>,
    pub queue: QueueStatus,
    pub queue_stats: QueueStats,
    pub handles: HandleStats,
    pub sessions: SessionStats,
    pub timers: TimerMetrics,
    /// Time since the current epoch booted.
    pub uptime_ms: u64,
    /// Matches finished in the current epoch.
    pub total_matches: u64,
    /// Time until the current match or intermission timer fires.
    pub phase_remaining_ms: Option<u64>,
    pub time_to_next_reset_ms: Option<u64>,
    /// How many times the current intermission was extended for lack of
    /// players.
    pub intermission_extensions: u32,
    /// Subscribed listeners.
    pub listeners: usize,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub(crate) struct Coordinator {
    config: CycleConfig,
    phase: Phase,
    epoch: u64,
    /// Per-epoch match counter; the next match gets `match_seq + 1`.
    match_seq: u64,
    current_match: Option<MatchRecord>,
    history: VecDeque<MatchRecord>,
    total_matches: u64,
    intermission_extensions: u32,
    epoch_started_at: Instant,

    sessions: SessionStore,
    handles: HandleRegistry,
    queue: MatchmakingQueue,
    listeners: ListenerRegistry,

    timers: TimerService,
    match_timer: Option<TimerId>,
    intermission_timer: Option<TimerId>,
    reset_timer: Option<TimerId>,

    /// Weak so that the actor stops once every handle is dropped.
    mailbox: mpsc::WeakUnboundedSender<Command>,
    receiver: mpsc::UnboundedReceiver<Command>,
}

impl Coordinator {
    pub(crate) fn new(
        config: CycleConfig,
        mailbox: mpsc::WeakUnboundedSender<Command>,
        receiver: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let sessions = SessionStore::new(config.session_config());
        let queue = MatchmakingQueue::new(config.queue_config());
        let history = VecDeque::with_capacity(config.match_history_len);
        Self {
            config,
            phase: Phase::ServerStart,
            epoch: 0,
            match_seq: 0,
            current_match: None,
            history,
            total_matches: 0,
            intermission_extensions: 0,
            epoch_started_at: Instant::now(),
            sessions,
            handles: HandleRegistry::new(),
            queue,
            listeners: ListenerRegistry::new(),
            timers: TimerService::new(),
            match_timer: None,
            intermission_timer: None,
            reset_timer: None,
            mailbox,
            receiver,
        }
    }

    /// Boots the first epoch, then processes commands until shutdown or
    /// until every handle is dropped.
    pub(crate) async fn run(mut self) {
        info!("coordinator started");
        self.boot();

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                Command::Shutdown => {
                    info!(epoch = self.epoch, "coordinator shutting down");
                    break;
                }
                Command::ForceReset { reply } => {
                    info!(epoch = self.epoch, "reset requested");
                    self.reset().await;
                    let _ = reply.send(());
                }
                Command::TimerFired { kind, id } => self.on_timer(kind, id).await,
                other => self.handle(other),
            }
        }

        self.timers.cancel_all();
        info!("coordinator stopped");
    }

    /// Dispatches every command that completes without awaiting.
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.connect(connection_id));
            }
            Command::Disconnect {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.disconnect(connection_id));
            }
            Command::Reconnect {
                session_id,
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.reconnect(&session_id, connection_id));
            }
            Command::ClaimHandle {
                session_id,
                handle,
                reply,
            } => {
                let _ = reply.send(self.claim_handle(&session_id, &handle));
            }
            Command::JoinQueue { session_id, reply } => {
                let _ = reply.send(self.join_queue(&session_id));
            }
            Command::LeaveQueue { session_id, reply } => {
                let _ = reply.send(self.queue.dequeue(&mut self.sessions, &session_id));
            }
            Command::RecordResults { results, reply } => {
                let _ = reply.send(self.record_match_results(results));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Subscribe {
                kinds,
                listener,
                reply,
            } => {
                let _ = reply.send(self.listeners.subscribe(&kinds, listener));
            }
            Command::Unsubscribe { listener_id, reply } => {
                let _ = reply.send(self.listeners.unsubscribe(listener_id));
            }
            Command::MaintenanceTick { reply } => {
                let _ = reply.send(self.maintenance());
            }
            Command::Session { session_id, reply } => {
                let _ = reply.send(self.sessions.get(&session_id).cloned());
            }
            Command::LookupHandle { handle, reply } => {
                let _ = reply.send(self.handles.lookup(&handle).cloned());
            }
            Command::MatchHistory { reply } => {
                let _ = reply.send(self.history.iter().cloned().collect());
            }
            Command::ForceReset { .. } | Command::TimerFired { .. } | Command::Shutdown => {
                // Handled in `run`.
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    fn connect(&mut self, connection_id: ConnectionId) -> SessionId {
        // The gateway reused a connection id without reporting the
        // disconnect; treat the old session as disconnected.
        if let Some(previous) = self.sessions.session_for_connection(connection_id).cloned() {
            self.detach(&previous);
        }
        self.sessions.create(connection_id)
    }

    fn disconnect(&mut self, connection_id: ConnectionId) -> Result<SessionId, CycleError> {
        let session_id = self
            .sessions
            .mark_disconnected(connection_id)
            .ok_or(CycleError::UnknownConnection(connection_id))?;
        self.detach(&session_id);
        Ok(session_id)
    }

    fn reconnect(
        &mut self,
        session_id: &SessionId,
        connection_id: ConnectionId,
    ) -> Result<(), CycleError> {
        let displaced = self
            .sessions
            .session_for_connection(connection_id)
            .filter(|previous| *previous != session_id)
            .cloned();

        self.sessions.reconnect(session_id, connection_id)?;
        if let Some(previous) = displaced {
            self.detach(&previous);
        }
        self.handles.reactivate(session_id);
        info!(%session_id, %connection_id, "session reconnected");
        Ok(())
    }

    /// Takes a session that lost its connection out of the queue and marks
    /// its handle inactive. An Active session stays in its match.
    fn detach(&mut self, session_id: &SessionId) {
        self.queue.dequeue(&mut self.sessions, session_id);
        self.handles.mark_inactive(session_id);
    }

    fn claim_handle(&mut self, session_id: &SessionId, handle: &str) -> Result<(), CycleError> {
        if self.sessions.get(session_id).is_none() {
            return Err(CycleError::UnknownSession(session_id.clone()));
        }
        self.handles.claim(session_id, handle)?;
        self.sessions.set_handle(session_id, handle)?;
        info!(%session_id, handle, "handle claimed");
        Ok(())
    }

    fn join_queue(&mut self, session_id: &SessionId) -> Result<usize, CycleError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| CycleError::UnknownSession(session_id.clone()))?;
        let handle = session
            .handle
            .clone()
            .ok_or_else(|| CycleError::HandleRequired(session_id.clone()))?;
        let position = self.queue.enqueue(&mut self.sessions, session_id, &handle)?;
        Ok(position)
    }

    // -----------------------------------------------------------------------
    // Phase transitions
    // -----------------------------------------------------------------------

    /// Starts a fresh epoch: arms the daily reset and opens the first
    /// intermission.
    fn boot(&mut self) {
        self.epoch += 1;
        self.match_seq = 0;
        self.total_matches = 0;
        self.epoch_started_at = Instant::now();
        self.arm(TimerKind::ServerReset, self.config.reset_interval);
        info!(epoch = self.epoch, "epoch booted");
        self.enter_intermission();
    }

    fn enter_intermission(&mut self) {
        self.current_match = None;
        self.intermission_extensions = 0;
        self.set_phase(Phase::Intermission);
        self.arm(TimerKind::Intermission, self.config.intermission_duration);
    }

    async fn on_timer(&mut self, kind: TimerKind, id: TimerId) {
        let slot = self.timer_slot(kind);
        if *slot != Some(id) {
            debug!(%kind, timer_id = %id, "stale timer firing ignored");
            return;
        }
        *slot = None;

        match kind {
            TimerKind::Intermission => self.on_intermission_elapsed(),
            TimerKind::Match => self.end_match(),
            TimerKind::ServerReset => {
                info!(epoch = self.epoch, "scheduled reset");
                self.reset().await;
            }
        }
    }

    fn on_intermission_elapsed(&mut self) {
        let participants = self.queue.select_for_match(&mut self.sessions);
        if participants.is_empty() {
            self.intermission_extensions += 1;
            info!(
                waiting = self.queue.len(),
                needed = self.config.min_match_players,
                extensions = self.intermission_extensions,
                "not enough players, intermission extended"
            );
            self.arm(TimerKind::Intermission, self.config.intermission_duration);
            return;
        }
        self.start_match(participants);
    }

    fn start_match(&mut self, participants: Vec<SessionId>) {
        self.match_seq += 1;
        let match_id = MatchId {
            epoch: self.epoch,
            seq: self.match_seq,
        };
        let record = MatchRecord::new(match_id, unix_millis(), participants);
        info!(%match_id, players = record.participants.len(), "match started");

        self.current_match = Some(record.clone());
        self.intermission_extensions = 0;
        self.set_phase(Phase::ActiveMatch);
        self.emit(Notification::MatchStarted {
            match_record: record,
            timestamp: unix_millis(),
        });
        self.arm(TimerKind::Match, self.config.match_duration);
    }

    fn end_match(&mut self) {
        let Some(mut record) = self.current_match.take() else {
            warn!("match timer fired with no match running");
            self.enter_intermission();
            return;
        };
        record.ended_at = Some(unix_millis());
        info!(
            match_id = %record.match_id,
            results = record.results.is_some(),
            "match ended"
        );
        self.emit(Notification::MatchEnded {
            match_record: record.clone(),
            timestamp: unix_millis(),
        });

        let outcome = self
            .queue
            .requeue_after_match(&mut self.sessions, &record.participants);
        for relegation in outcome.relegations() {
            self.emit_relegation(relegation);
        }

        self.archive(record);
        self.total_matches += 1;
        self.enter_intermission();
    }

    fn archive(&mut self, record: MatchRecord) {
        if self.config.match_history_len == 0 {
            return;
        }
        while self.history.len() >= self.config.match_history_len {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    /// Wipes the epoch, waits out the reset pause, and boots again.
    ///
    /// This is the only handler that awaits. Commands sent meanwhile stay
    /// in the mailbox and are processed against the rebooted state.
    async fn reset(&mut self) {
        let uptime_ms = self.epoch_started_at.elapsed().as_millis() as u64;
        let total_matches = self.total_matches;

        let cancelled = self.timers.cancel_all();
        self.match_timer = None;
        self.intermission_timer = None;
        self.reset_timer = None;

        self.handles.reset_all();
        self.sessions.reset_all();
        self.queue.reset_all();
        self.current_match = None;
        self.history.clear();
        self.total_matches = 0;
        self.intermission_extensions = 0;

        info!(
            epoch = self.epoch,
            uptime_ms,
            total_matches,
            cancelled_timers = cancelled,
            "epoch wiped"
        );
        self.set_phase(Phase::ServerStart);
        self.emit(Notification::ServerReset {
            timestamp: unix_millis(),
            uptime_ms,
            total_matches,
        });

        time::sleep(self.config.reset_pause).await;
        self.boot();
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase changed");
        self.phase = phase;
        self.emit(Notification::PhaseChanged {
            new_phase: phase,
            timestamp: unix_millis(),
        });
    }

    // -----------------------------------------------------------------------
    // Results and relegation
    // -----------------------------------------------------------------------

    fn record_match_results(
        &mut self,
        results: Vec<ParticipantResult>,
    ) -> Result<RecordOutcome, CycleError> {
        if !self.phase.accepts_results() {
            return Err(CycleError::NoActiveMatch);
        }
        let current = self.current_match.as_mut().ok_or(CycleError::NoActiveMatch)?;
        if current.results.is_some() {
            return Err(CycleError::ResultsAlreadyRecorded(current.match_id));
        }

        let total_players = current.participants.len();
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        let mut ignored = Vec::new();
        for result in results {
            let valid = current.is_participant(&result.session_id)
                && (1..=total_players).contains(&(result.rank as usize))
                && seen.insert(result.session_id.clone());
            if valid {
                accepted.push(result);
            } else {
                ignored.push(result);
            }
        }

        // A participant purged since the match started has nowhere to
        // keep the result.
        let mut applied = Vec::with_capacity(accepted.len());
        for result in accepted {
            let kept = self.sessions.record_performance(
                &result.session_id,
                current.match_id,
                result.rank,
                result.score,
                total_players,
            );
            if kept {
                applied.push(result);
            } else {
                debug!(
                    match_id = %current.match_id,
                    session_id = %result.session_id,
                    "result for purged session ignored"
                );
                ignored.push(result);
            }
        }
        let recorded = applied.len();
        current.results = Some(applied);

        info!(
            match_id = %current.match_id,
            recorded,
            ignored = ignored.len(),
            "match results recorded"
        );
        Ok(RecordOutcome {
            match_id: current.match_id,
            recorded,
            ignored,
        })
    }

    fn emit_relegation(&self, record: &RelegationRecord) {
        info!(
            session_id = %record.session_id,
            handle = record.handle.as_deref().unwrap_or("-"),
            streak = record.relegation_streak,
            "session relegated"
        );
        self.emit(Notification::PlayerRelegated {
            session_id: record.session_id.clone(),
            handle: record.handle.clone(),
            relegation_streak: record.relegation_streak,
            timestamp: record.relegated_at,
        });
    }

    /// Periodic housekeeping, driven from outside the actor.
    fn maintenance(&mut self) -> MaintenanceReport {
        let stale_purged = self.sessions.cleanup_stale(self.config.stale_session_cutoff);
        let queue_cleaned = self.queue.cleanup(&mut self.sessions);

        let mut relegated = Vec::new();
        if self.phase == Phase::Intermission {
            let mut candidates = self.sessions.sessions_in_state(LifecycleState::Active);
            candidates.extend(self.sessions.sessions_in_state(LifecycleState::Queued));
            for session_id in candidates {
                if !self.sessions.is_relegation_eligible(&session_id) {
                    continue;
                }
                if let Some(record) = self.sessions.relegate(&session_id) {
                    self.queue.dequeue(&mut self.sessions, &session_id);
                    self.emit_relegation(&record);
                    relegated.push(record);
                }
            }
        }

        if !stale_purged.is_empty() || queue_cleaned > 0 || !relegated.is_empty() {
            info!(
                stale = stale_purged.len(),
                queue_cleaned,
                relegated = relegated.len(),
                "maintenance pass"
            );
        }
        MaintenanceReport {
            stale_purged,
            queue_cleaned,
            relegated,
        }
    }

    // -----------------------------------------------------------------------
    // Timers, notifications, snapshot
    // -----------------------------------------------------------------------

    fn timer_slot(&mut self, kind: TimerKind) -> &mut Option<TimerId> {
        match kind {
            TimerKind::Match => &mut self.match_timer,
            TimerKind::Intermission => &mut self.intermission_timer,
            TimerKind::ServerReset => &mut self.reset_timer,
        }
    }

    /// Schedules `kind`, replacing any timer of the same kind still armed.
    fn arm(&mut self, kind: TimerKind, duration: Duration) {
        if let Some(previous) = self.timer_slot(kind).take() {
            self.timers.cancel(previous);
        }

        let mailbox = self.mailbox.clone();
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let scheduled = self.timers.schedule(kind, millis, move |id| {
            let sender = mailbox.upgrade().ok_or("coordinator stopped")?;
            sender
                .send(Command::TimerFired { kind, id })
                .map_err(|_| "coordinator mailbox closed")?;
            Ok(())
        });

        match scheduled {
            Ok(id) => {
                debug!(%kind, timer_id = %id, duration_ms = millis, "timer armed");
                *self.timer_slot(kind) = Some(id);
            }
            Err(e) => error!(%kind, error = %e, "failed to arm timer"),
        }
    }

    fn remaining_ms(&self, id: Option<TimerId>) -> Option<u64> {
        id.and_then(|id| self.timers.remaining(id))
            .map(|d| d.as_millis() as u64)
    }

    fn emit(&self, notification: Notification) {
        self.listeners.emit(&notification);
    }

    fn snapshot(&self) -> CycleSnapshot {
        let phase_timer = match self.phase {
            Phase::ActiveMatch => self.match_timer,
            Phase::Intermission => self.intermission_timer,
            Phase::ServerStart => None,
        };
        CycleSnapshot {
            epoch: self.epoch,
            phase: self.phase,
            active_match: self.current_match.clone(),
            queue: self.queue.status(),
            queue_stats: self.queue.stats(),
            handles: self.handles.stats(),
            sessions: self.sessions.stats(),
            timers: self.timers.metrics(),
            uptime_ms: self.epoch_started_at.elapsed().as_millis() as u64,
            total_matches: self.total_matches,
            phase_remaining_ms: self.remaining_ms(phase_timer),
            time_to_next_reset_ms: self.remaining_ms(self.reset_timer),
            intermission_extensions: self.intermission_extensions,
            listeners: self.listeners.len(),
        }
    }
}
