//! Named, cancellable, fire-once timers for Cadence.
//!
//! The lifecycle coordinator never sleeps itself. It asks the
//! [`TimerService`] to call it back later: "end the match in 5 minutes",
//! "try to start a match in 2 minutes", "reset the server in 24 hours".
//!
//! # Guarantees
//!
//! - A callback fires **at most once**, after which its timer is retired.
//! - A cancelled timer never fires, even if its deadline has already
//!   passed but the task has not been polled yet.
//! - A failing callback (returned `Err` or a panic) is caught and logged.
//!   It never escapes into the Tokio runtime.
//!
//! The service does not know that only one match timer may be outstanding
//! at a time. That rule belongs to the coordinator.
//!
//! # Integration
//!
//! Callbacks should be quick and non-blocking. The coordinator's callbacks
//! just post a message into its own mailbox:
//!
//! ```ignore
//! let tx = mailbox.downgrade();
//! timers.schedule(TimerKind::Match, 300_000, move |id| {
//!     let tx = tx.upgrade().ok_or("coordinator stopped")?;
//!     tx.send(Command::TimerFired { kind: TimerKind::Match, id })?;
//!     Ok(())
//! })?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, trace, warn};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Ends the running match.
    Match,
    /// Attempts to start the next match.
    Intermission,
    /// Wipes the epoch and reboots.
    ServerReset,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "MATCH"),
            Self::Intermission => write!(f, "INTERMISSION"),
            Self::ServerReset => write!(f, "SERVER_RESET"),
        }
    }
}

/// Identifies one scheduled callback. Never reused by the same service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the underlying counter value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Errors and callbacks
// ---------------------------------------------------------------------------

/// Errors returned by [`TimerService::schedule`].
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// Durations must be zero or positive.
    #[error("invalid timer duration: {0} ms")]
    InvalidDuration(i64),
}

/// Error type a callback may return. Logged, never propagated.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// A snapshot of one outstanding timer.
#[derive(Debug, Clone)]
pub struct TimerInfo {
    pub id: TimerId,
    pub kind: TimerKind,
    pub started_at: Instant,
    pub duration: Duration,
}

impl TimerInfo {
    /// When the callback is due.
    pub fn deadline(&self) -> Instant {
        self.started_at + self.duration
    }
}

/// Lifetime counters for a [`TimerService`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerMetrics {
    pub scheduled: u64,
    pub fired: u64,
    pub cancelled: u64,
    /// Callbacks that returned `Err` or panicked.
    pub callback_failures: u64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

struct TimerEntry {
    info: TimerInfo,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    next_id: u64,
    timers: HashMap<TimerId, TimerEntry>,
    metrics: TimerMetrics,
}

/// Schedules fire-once callbacks on the Tokio runtime.
///
/// Each timer is a small Tokio task sleeping until its deadline. The table
/// of outstanding timers is shared with those tasks so a firing task can
/// retire its own entry. The `Mutex` is only held for map operations,
/// never across an `.await`.
pub struct TimerService {
    table: Arc<Mutex<TimerTable>>,
}

impl TimerService {
    /// Creates a service with no outstanding timers.
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    /// Schedules `callback` to run once after `duration_ms` milliseconds.
    ///
    /// The callback receives its own [`TimerId`] so it can tell the owner
    /// which timer fired. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`TimerError::InvalidDuration`] if `duration_ms` is negative.
    pub fn schedule<F>(
        &self,
        kind: TimerKind,
        duration_ms: i64,
        callback: F,
    ) -> Result<TimerId, TimerError>
    where
        F: FnOnce(TimerId) -> Result<(), CallbackError> + Send + 'static,
    {
        if duration_ms < 0 {
            warn!(%kind, duration_ms, "rejected timer with negative duration");
            return Err(TimerError::InvalidDuration(duration_ms));
        }

        let duration = Duration::from_millis(duration_ms as u64);
        let started_at = Instant::now();
        let deadline = started_at + duration;

        // Hold the lock across spawn + insert so the task can never look
        // for its entry before it exists.
        let mut table = lock(&self.table);
        table.next_id += 1;
        let id = TimerId(table.next_id);

        let shared = Arc::clone(&self.table);
        let task = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            fire(&shared, id, callback);
        });

        table.timers.insert(
            id,
            TimerEntry {
                info: TimerInfo {
                    id,
                    kind,
                    started_at,
                    duration,
                },
                task,
            },
        );
        table.metrics.scheduled += 1;

        debug!(%id, %kind, duration_ms, "timer scheduled");
        Ok(id)
    }

    /// Cancels an outstanding timer.
    ///
    /// Returns `false` if the timer already fired, was already cancelled,
    /// or never existed.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut table = lock(&self.table);
        match table.timers.remove(&id) {
            Some(entry) => {
                entry.task.abort();
                table.metrics.cancelled += 1;
                debug!(%id, kind = %entry.info.kind, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Time left before `id` fires, or `None` if it is not outstanding.
    pub fn remaining(&self, id: TimerId) -> Option<Duration> {
        let table = lock(&self.table);
        table
            .timers
            .get(&id)
            .map(|entry| entry.info.deadline().saturating_duration_since(Instant::now()))
    }

    /// Cancels every outstanding timer. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut table = lock(&self.table);
        let drained: Vec<TimerEntry> = table.timers.drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.task.abort();
        }
        table.metrics.cancelled += drained.len() as u64;
        debug!(count = drained.len(), "all timers cancelled");
        drained.len()
    }

    /// Snapshot of an outstanding timer.
    pub fn info(&self, id: TimerId) -> Option<TimerInfo> {
        lock(&self.table).timers.get(&id).map(|entry| entry.info.clone())
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn active_count(&self) -> usize {
        lock(&self.table).timers.len()
    }

    /// Lifetime counters.
    pub fn metrics(&self) -> TimerMetrics {
        lock(&self.table).metrics.clone()
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        let mut table = lock(&self.table);
        for (_, entry) in table.timers.drain() {
            entry.task.abort();
        }
    }
}

/// Runs inside the timer task once the deadline passes.
fn fire<F>(table: &Mutex<TimerTable>, id: TimerId, callback: F)
where
    F: FnOnce(TimerId) -> Result<(), CallbackError>,
{
    let kind = {
        let mut table = lock(table);
        let Some(entry) = table.timers.remove(&id) else {
            // Cancelled between wake-up and now.
            return;
        };
        table.metrics.fired += 1;
        entry.info.kind
    };

    trace!(%id, %kind, "timer fired");

    let failed = match panic::catch_unwind(AssertUnwindSafe(|| callback(id))) {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            error!(%id, %kind, error = %e, "timer callback failed");
            true
        }
        Err(_) => {
            error!(%id, %kind, "timer callback panicked");
            true
        }
    };

    if failed {
        lock(table).metrics.callback_failures += 1;
    }
}

/// A poisoned table only means a previous holder panicked mid-update of
/// plain counters and maps; the data is still usable.
fn lock(table: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
