//! The handle registry: one unique display name per session per epoch.
//!
//! Handles are never released individually. A player who disconnects keeps
//! their handle (it just goes inactive), and a purged session's handle stays
//! claimed until the next epoch reset. This stops anyone from grabbing a
//! well-known name the moment its owner's Wi-Fi drops.

use std::collections::HashMap;

use cadence_protocol::{unix_millis, SessionId};
use serde::{Deserialize, Serialize};

use crate::HandleRejection;

const MIN_HANDLE_LEN: usize = 3;
const MAX_HANDLE_LEN: usize = 20;

/// One claimed handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    pub handle: String,
    pub session_id: SessionId,
    /// Unix milliseconds.
    pub claimed_at: u64,
    /// `false` while the owning session is disconnected.
    pub is_active: bool,
}

/// Counts for the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleStats {
    pub claimed: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Enforces handle uniqueness for the current epoch.
///
/// Two maps are kept in lockstep: `handle → record` for lookups by name,
/// `session → handle` for the one-handle-per-session rule. Every mutation
/// below touches both or neither.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    by_handle: HashMap<String, HandleRecord>,
    by_session: HashMap<SessionId, String>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `proposed` for `session_id`.
    ///
    /// Checks run in order: format, then uniqueness, then the
    /// one-handle-per-session rule. A string someone already holds is
    /// therefore always reported as [`HandleRejection::AlreadyTaken`].
    pub fn claim(
        &mut self,
        session_id: &SessionId,
        proposed: &str,
    ) -> Result<&HandleRecord, HandleRejection> {
        if !is_valid_handle(proposed) {
            return Err(HandleRejection::InvalidFormat(proposed.to_string()));
        }
        if self.by_handle.contains_key(proposed) {
            return Err(HandleRejection::AlreadyTaken(proposed.to_string()));
        }
        if self.by_session.contains_key(session_id) {
            return Err(HandleRejection::SessionAlreadyHasHandle(session_id.clone()));
        }

        let record = HandleRecord {
            handle: proposed.to_string(),
            session_id: session_id.clone(),
            claimed_at: unix_millis(),
            is_active: true,
        };
        self.by_session
            .insert(session_id.clone(), proposed.to_string());
        tracing::info!(%session_id, handle = proposed, "handle claimed");
        Ok(self.by_handle.entry(proposed.to_string()).or_insert(record))
    }

    /// Marks the session's handle inactive. Returns `false` if it has none.
    pub fn mark_inactive(&mut self, session_id: &SessionId) -> bool {
        self.set_active(session_id, false)
    }

    /// Marks the session's handle active again after a reconnect.
    pub fn reactivate(&mut self, session_id: &SessionId) -> bool {
        self.set_active(session_id, true)
    }

    fn set_active(&mut self, session_id: &SessionId, active: bool) -> bool {
        let Some(handle) = self.by_session.get(session_id) else {
            return false;
        };
        match self.by_handle.get_mut(handle) {
            Some(record) => {
                record.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Looks up a handle by its exact (case-sensitive) string.
    pub fn lookup(&self, handle: &str) -> Option<&HandleRecord> {
        self.by_handle.get(handle)
    }

    /// The handle claimed by `session_id`, if any.
    pub fn handle_of(&self, session_id: &SessionId) -> Option<&str> {
        self.by_session.get(session_id).map(String::as_str)
    }

    pub fn claimed_count(&self) -> usize {
        self.by_handle.len()
    }

    pub fn active_count(&self) -> usize {
        self.by_handle.values().filter(|r| r.is_active).count()
    }

    pub fn stats(&self) -> HandleStats {
        let claimed = self.claimed_count();
        let active = self.active_count();
        HandleStats {
            claimed,
            active,
            inactive: claimed - active,
        }
    }

    /// Releases every handle. The only release mechanism.
    pub fn reset_all(&mut self) {
        let released = self.by_handle.len();
        self.by_handle.clear();
        self.by_session.clear();
        tracing::info!(released, "handle registry reset");
    }
}

/// 3–20 characters, each an ASCII letter, digit, or underscore.
pub fn is_valid_handle(handle: &str) -> bool {
    (MIN_HANDLE_LEN..=MAX_HANDLE_LEN).contains(&handle.len())
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
