//! Error types for the session layer.

use cadence_protocol::{ConnectionId, SessionId};

/// Errors from [`SessionStore`](crate::SessionStore) operations.
///
/// All of these are "invalid call" errors: the store is left unchanged
/// and the caller decides whether to log or report them.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists with this id (never created, purged as stale,
    /// or wiped by an epoch reset).
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// No session is linked to this connection.
    #[error("no session for connection {0}")]
    UnknownConnection(ConnectionId),

    /// The session already has a handle. Handles are immutable once set.
    #[error("session {0} already has a handle")]
    HandleAlreadySet(SessionId),

    /// The session is relegated and cannot change state again this epoch.
    #[error("session {0} is relegated")]
    Relegated(SessionId),

    /// The session already has a live connection.
    #[error("session {0} is already connected")]
    AlreadyConnected(SessionId),
}

/// Why a handle claim was rejected.
///
/// These are validation results for the player, not faults. The gateway
/// forwards the message text straight back to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleRejection {
    /// Handles must be 3–20 characters of letters, digits, or underscore.
    #[error("invalid handle format: {0:?}")]
    InvalidFormat(String),

    /// Another session already owns this exact handle this epoch.
    #[error("handle {0:?} is already taken")]
    AlreadyTaken(String),

    /// One handle per session, even across reconnects.
    #[error("session {0} already has a handle")]
    SessionAlreadyHasHandle(SessionId),
}
