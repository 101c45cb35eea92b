//! Public handle to the coordinator task.

use std::sync::Arc;

use cadence_protocol::{
    ConnectionId, MatchRecord, Notification, NotificationKind, ParticipantResult, SessionId,
};
use cadence_session::{HandleRecord, Session};
use tokio::sync::{mpsc, oneshot};

use crate::coordinator::{Command, Coordinator, CycleSnapshot, MaintenanceReport, RecordOutcome};
use crate::notify::{Listener, ListenerError, ListenerId};
use crate::{CycleConfig, CycleError};

/// Handle to a running coordinator. Used to send it commands.
///
/// Cheap to clone: it wraps an `mpsc::UnboundedSender`. Every method
/// returns [`CycleError::Unavailable`] once the coordinator has stopped.
/// The coordinator stops when [`shutdown`](Self::shutdown) is called or
/// when the last handle is dropped.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Sends a command built around a fresh reply channel and waits for
    /// the answer.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CycleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .map_err(|_| CycleError::Unavailable)?;
        reply_rx.await.map_err(|_| CycleError::Unavailable)
    }

    /// Creates a session for a new connection.
    pub async fn connect(&self, connection_id: ConnectionId) -> Result<SessionId, CycleError> {
        self.request(|reply| Command::Connect {
            connection_id,
            reply,
        })
        .await
    }

    /// Marks the connection's session disconnected, removes it from the
    /// queue, and deactivates its handle.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<SessionId, CycleError> {
        self.request(|reply| Command::Disconnect {
            connection_id,
            reply,
        })
        .await?
    }

    /// Links an existing, disconnected session to a new connection.
    pub async fn reconnect(
        &self,
        session_id: SessionId,
        connection_id: ConnectionId,
    ) -> Result<(), CycleError> {
        self.request(|reply| Command::Reconnect {
            session_id,
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn claim_handle(
        &self,
        session_id: SessionId,
        handle: impl Into<String>,
    ) -> Result<(), CycleError> {
        let handle = handle.into();
        self.request(|reply| Command::ClaimHandle {
            session_id,
            handle,
            reply,
        })
        .await?
    }

    /// Joins the matchmaking queue. Returns the 1-based position.
    pub async fn join_queue(&self, session_id: SessionId) -> Result<usize, CycleError> {
        self.request(|reply| Command::JoinQueue { session_id, reply })
            .await?
    }

    /// Leaves the queue. Returns `false` if the session was not queued.
    pub async fn leave_queue(&self, session_id: SessionId) -> Result<bool, CycleError> {
        self.request(|reply| Command::LeaveQueue { session_id, reply })
            .await
    }

    /// Records ranks and scores for the running match.
    ///
    /// # Errors
    /// - [`CycleError::NoActiveMatch`] outside an active match
    /// - [`CycleError::ResultsAlreadyRecorded`] on a second call for the
    ///   same match
    pub async fn record_match_results(
        &self,
        results: Vec<ParticipantResult>,
    ) -> Result<RecordOutcome, CycleError> {
        self.request(|reply| Command::RecordResults { results, reply })
            .await?
    }

    /// Wipes the epoch and reboots. Resolves after the reset pause, once
    /// the new epoch is in its first intermission.
    pub async fn force_reset(&self) -> Result<(), CycleError> {
        self.request(|reply| Command::ForceReset { reply }).await
    }

    pub async fn snapshot(&self) -> Result<CycleSnapshot, CycleError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Registers `listener` for each kind in `kinds`.
    ///
    /// The listener runs on the coordinator task. Keep it short; forward
    /// into a channel if there is real work to do. Errors and panics are
    /// logged and do not affect other listeners.
    pub async fn subscribe<F>(
        &self,
        kinds: &[NotificationKind],
        listener: F,
    ) -> Result<ListenerId, CycleError>
    where
        F: Fn(&Notification) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let kinds = kinds.to_vec();
        let listener: Listener = Arc::new(listener);
        self.request(|reply| Command::Subscribe {
            kinds,
            listener,
            reply,
        })
        .await
    }

    pub async fn unsubscribe(&self, listener_id: ListenerId) -> Result<bool, CycleError> {
        self.request(|reply| Command::Unsubscribe { listener_id, reply })
            .await
    }

    /// Runs one housekeeping pass: stale-session purge, queue cleanup, and
    /// (during an intermission) relegation of eligible sessions.
    pub async fn maintenance_tick(&self) -> Result<MaintenanceReport, CycleError> {
        self.request(|reply| Command::MaintenanceTick { reply })
            .await
    }

    pub async fn session(&self, session_id: SessionId) -> Result<Option<Session>, CycleError> {
        self.request(|reply| Command::Session { session_id, reply })
            .await
    }

    pub async fn lookup_handle(
        &self,
        handle: impl Into<String>,
    ) -> Result<Option<HandleRecord>, CycleError> {
        let handle = handle.into();
        self.request(|reply| Command::LookupHandle { handle, reply })
            .await
    }

    /// Finished matches of the current epoch, oldest first.
    pub async fn match_history(&self) -> Result<Vec<MatchRecord>, CycleError> {
        self.request(|reply| Command::MatchHistory { reply }).await
    }

    /// Stops the coordinator. Outstanding timers are cancelled.
    pub fn shutdown(&self) -> Result<(), CycleError> {
        self.sender
            .send(Command::Shutdown)
            .map_err(|_| CycleError::Unavailable)
    }

    /// Whether the coordinator task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Spawns the coordinator task and returns a handle to it.
///
/// The config is passed through [`CycleConfig::validated`]. The first
/// epoch boots as soon as the task starts. Must be called from within a
/// Tokio runtime.
pub fn spawn_coordinator(config: CycleConfig) -> CoordinatorHandle {
    let config = config.validated();
    let (tx, rx) = mpsc::unbounded_channel();

    let coordinator = Coordinator::new(config, tx.downgrade(), rx);
    tokio::spawn(coordinator.run());

    CoordinatorHandle { sender: tx }
}
