//! Match-cycle lifecycle coordinator for Cadence.
//!
//! The coordinator is the only component that changes the global phase.
//! It runs as a single Tokio task (actor model) that owns the session
//! store, handle registry, matchmaking queue, and timers; the outside
//! world talks to it through a cloneable [`CoordinatorHandle`].
//!
//! ```text
//! ServerStart ──boot──→ Intermission ⇄ ActiveMatch
//!      ↑                      │             │
//!      └────── ServerReset (daily, or force_reset) ──┘
//! ```
//!
//! # Key types
//!
//! - [`spawn_coordinator`]: start the actor
//! - [`CoordinatorHandle`]: connect, queue, record results, subscribe
//! - [`CycleConfig`]: durations, player bounds, relegation policy
//! - [`CycleSnapshot`]: read-only view of the whole cycle
//! - [`CycleError`]: every way a call can fail

mod config;
mod coordinator;
mod error;
mod handle;
mod notify;

pub use config::CycleConfig;
pub use coordinator::{CycleSnapshot, MaintenanceReport, RecordOutcome};
pub use error::CycleError;
pub use handle::{spawn_coordinator, CoordinatorHandle};
pub use notify::{Listener, ListenerError, ListenerId};
