//! Unified error type for Cadence.

use cadence_cycle::CycleError;
use cadence_protocol::ProtocolError;
use cadence_queue::QueueRejection;
use cadence_session::{HandleRejection, SessionError};
use cadence_timer::TimerError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `cadence` facade, you deal with this single error type
/// instead of importing errors from each sub-crate. `#[from]` on each
/// variant lets `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// Encoding or decoding a notification failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A timer could not be scheduled.
    #[error(transparent)]
    Timer(#[from] TimerError),

    /// A session-store operation failed (not found, relegated, ...).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A handle claim was rejected.
    #[error(transparent)]
    Handle(#[from] HandleRejection),

    /// A queue join was rejected.
    #[error(transparent)]
    Queue(#[from] QueueRejection),

    /// A coordinator call failed.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A global tracing subscriber was already installed.
    #[error(transparent)]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
}
