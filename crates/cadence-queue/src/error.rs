//! Error types for the queue layer.

use cadence_protocol::SessionId;

/// Why a session could not join the queue.
///
/// These are validation results, returned to the player. The queue is
/// unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueRejection {
    /// The session does not exist or is disconnected.
    #[error("session {0} is not a valid connected session")]
    InvalidSession(SessionId),

    /// The handle supplied does not match the handle the session claimed.
    #[error("handle does not match the handle claimed by session {0}")]
    HandleMismatch(SessionId),

    /// The session is already waiting in the queue.
    #[error("session {0} is already queued")]
    AlreadyQueued(SessionId),

    /// The queue is at capacity.
    #[error("queue is full ({0} entries)")]
    QueueFull(usize),

    /// Relegated sessions may not play again this epoch.
    #[error("session {0} is relegated")]
    SessionRelegated(SessionId),

    /// The session is playing the current match; it is requeued
    /// automatically when the match ends.
    #[error("session {0} is in the current match")]
    InMatch(SessionId),
}
