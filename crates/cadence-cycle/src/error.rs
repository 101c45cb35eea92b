//! Error types for the coordinator.

use cadence_protocol::{ConnectionId, MatchId, SessionId};
use cadence_queue::QueueRejection;
use cadence_session::{HandleRejection, SessionError};
use cadence_timer::TimerError;

/// Errors returned by [`CoordinatorHandle`](crate::CoordinatorHandle)
/// operations.
///
/// Every variant leaves the coordinator's state untouched.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The handle claim was refused.
    #[error(transparent)]
    Handle(#[from] HandleRejection),

    /// The queue join was refused.
    #[error(transparent)]
    Queue(#[from] QueueRejection),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    /// Results can only be recorded while a match is running.
    #[error("no active match")]
    NoActiveMatch,

    /// The running match already has results.
    #[error("results already recorded for match {0}")]
    ResultsAlreadyRecorded(MatchId),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("no session for connection {0}")]
    UnknownConnection(ConnectionId),

    /// Queue joins need a claimed handle.
    #[error("session {0} must claim handle first")]
    HandleRequired(SessionId),

    /// The coordinator task has stopped.
    #[error("coordinator is unavailable")]
    Unavailable,
}
